// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Scale-invariant (power-law) primordial spectrum.
//!
//! ```text
//! P(k) = 2π² k⁻² A_s (k / k_p)^(n_s − 1),   P(0) = 0
//! ```
//!
//! The `k⁻²` factor is the 2-D isotropic measure, so `k² P(k) / 2π²` is the
//! dimensionless spectrum `A_s (k/k_p)^(n_s−1)` that the estimator fits.

use crate::error::{ensure_positive, CosmosError, CosmosResult};
use crate::kspace::KSpaceGrid;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const DEFAULT_AMPLITUDE: f64 = 2.1e-9;
pub const DEFAULT_TILT: f64 = 0.96;
pub const DEFAULT_PIVOT: f64 = 0.05;

/// Normalisation shared by the model and the estimator's fit output.
pub const SPECTRUM_NORMALISATION: f64 = 2.0 * PI * PI;

/// Amplitude, tilt and pivot of the power law.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSpectrumParams {
    /// `A_s`, amplitude at the pivot.
    pub amplitude: f64,
    /// `n_s`, spectral index.
    pub tilt: f64,
    /// `k_p`, pivot wavenumber in the same inverse-length unit as the grid.
    pub pivot: f64,
}

impl Default for PowerSpectrumParams {
    fn default() -> Self {
        Self {
            amplitude: DEFAULT_AMPLITUDE,
            tilt: DEFAULT_TILT,
            pivot: DEFAULT_PIVOT,
        }
    }
}

impl PowerSpectrumParams {
    pub fn new(amplitude: f64, tilt: f64, pivot: f64) -> CosmosResult<Self> {
        let params = Self {
            amplitude,
            tilt,
            pivot,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> CosmosResult<()> {
        ensure_positive("amplitude", self.amplitude)?;
        ensure_positive("pivot", self.pivot)?;
        if !self.tilt.is_finite() {
            return Err(CosmosError::invalid("tilt", "must be finite"));
        }
        Ok(())
    }
}

/// Evaluates the power law on wavenumbers and grids.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleInvariantSpectrum {
    params: PowerSpectrumParams,
}

impl ScaleInvariantSpectrum {
    pub fn new(params: PowerSpectrumParams) -> CosmosResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> PowerSpectrumParams {
        self.params
    }

    /// Dimensionless spectrum `A_s (k/k_p)^(n_s−1)`.
    pub fn dimensionless(&self, k: f64) -> f64 {
        self.params.amplitude * (k / self.params.pivot).powf(self.params.tilt - 1.0)
    }

    /// Expected power of a single mode at wavenumber `k`.
    pub fn evaluate(&self, k: f64) -> f64 {
        if k == 0.0 {
            return 0.0;
        }
        SPECTRUM_NORMALISATION * self.dimensionless(k) / (k * k)
    }

    /// Power at every mode of `grid`; the mean mode carries none.
    pub fn power_grid(&self, grid: &KSpaceGrid) -> Array2<f64> {
        grid.magnitudes().mapv(|k| self.evaluate(k))
    }
}
