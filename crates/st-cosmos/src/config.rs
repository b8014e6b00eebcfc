// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{ensure_grid_size, ensure_positive, CosmosError, CosmosResult};
use crate::power::PowerSpectrumParams;
use crate::transfer::MONOPOLE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings for a [`FieldRealisation`](crate::realisation::FieldRealisation).
///
/// Every field has a default, so partial TOML/JSON documents are accepted:
///
/// ```toml
/// n = 256
/// scale = 1000.0
/// seed = 7
///
/// [spectrum]
/// tilt = 0.97
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealisationConfig {
    /// Grid side in pixels (even).
    pub n: usize,
    /// Physical side length of the map (Mpc).
    pub scale: f64,
    /// Power-law parameters used for implicit baseline builds.
    pub spectrum: PowerSpectrumParams,
    /// Density of the log-spaced wavenumbers sent to transfer providers.
    pub samples_per_decade: usize,
    /// Explicit RNG seed; `None` defers to the process determinism policy.
    pub seed: Option<u64>,
    /// Transfer source used when the caller does not name one.
    pub source: String,
}

impl Default for RealisationConfig {
    fn default() -> Self {
        Self {
            n: 1024,
            scale: 3000.0,
            spectrum: PowerSpectrumParams::default(),
            samples_per_decade: 50,
            seed: None,
            source: MONOPOLE.to_string(),
        }
    }
}

impl RealisationConfig {
    pub fn new(n: usize, scale: f64) -> Self {
        Self {
            n,
            scale,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_spectrum(mut self, spectrum: PowerSpectrumParams) -> Self {
        self.spectrum = spectrum;
        self
    }

    pub fn with_samples_per_decade(mut self, samples: usize) -> Self {
        self.samples_per_decade = samples;
        self
    }

    pub fn validate(&self) -> CosmosResult<()> {
        ensure_grid_size(self.n)?;
        ensure_positive("scale", self.scale)?;
        self.spectrum.validate()?;
        if self.samples_per_decade == 0 {
            return Err(CosmosError::invalid(
                "samples_per_decade",
                "at least one sample per decade is required",
            ));
        }
        if self.source.trim().is_empty() {
            return Err(CosmosError::invalid("source", "must not be empty"));
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> CosmosResult<Self> {
        let cfg: Self =
            toml::from_str(raw).map_err(|err| CosmosError::invalid("config", err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> CosmosResult<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|err| CosmosError::invalid("config", err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> CosmosResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            CosmosError::invalid("config", format!("{}: {err}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("toml") => Self::from_toml_str(&raw),
            other => Err(CosmosError::invalid(
                "config",
                format!("unsupported config extension {other:?}"),
            )),
        }
    }

    /// Applies `ST_COSMOS_N`, `ST_COSMOS_SCALE` and `ST_COSMOS_SEED`.
    pub fn apply_env_overrides(mut self) -> CosmosResult<Self> {
        if let Some(raw) = env_value("ST_COSMOS_N") {
            self.n = raw
                .parse()
                .map_err(|_| CosmosError::invalid("ST_COSMOS_N", format!("not an integer: {raw}")))?;
        }
        if let Some(raw) = env_value("ST_COSMOS_SCALE") {
            self.scale = raw
                .parse()
                .map_err(|_| CosmosError::invalid("ST_COSMOS_SCALE", format!("not a number: {raw}")))?;
        }
        if let Some(raw) = env_value("ST_COSMOS_SEED") {
            self.seed = Some(
                raw.parse()
                    .map_err(|_| CosmosError::invalid("ST_COSMOS_SEED", format!("not a u64: {raw}")))?,
            );
        }
        self.validate()?;
        Ok(self)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
