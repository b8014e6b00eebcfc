// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Binned isotropic power spectrum of a field, with a power-law fit.
//!
//! Every mode of the half spectrum except the mean contributes `|X|²`,
//! weighted by `k²` unless raw power is requested. Modes are grouped into
//! equal-width bins spanning the observed `|k|` range; the right edge of the
//! last bin is inclusive.

use crate::error::{ensure_positive, CosmosError, CosmosResult};
use crate::fft::RealFft2;
use crate::field::{FieldData, SpectralField};
use crate::fit::{fit_power_law, PowerLawFit};
use crate::kspace::KSpaceGrid;
use crate::power::DEFAULT_PIVOT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Comoving distance to last scattering (Mpc), mapping `k` to multipole `ℓ`.
pub const DISTANCE_TO_LAST_SCATTERING: f64 = 13_900.0;
/// Converts dimensionless temperature power to µK².
pub const MICRO_KELVIN_SQUARED: f64 = 2.725e6 * 2.725e6;

pub const DEFAULT_BINS: usize = 10;

/// Statistics of one `|k|` bin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumBin {
    /// Bin centre.
    pub k: f64,
    pub lower: f64,
    pub upper: f64,
    /// Mean power.
    pub power: f64,
    /// Population standard deviation of the power.
    pub std_dev: f64,
    /// Standard error of the mean, `std_dev / sqrt(count)`.
    pub error: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinnedSpectrum {
    bins: Vec<SpectrumBin>,
    raw: bool,
}

impl BinnedSpectrum {
    pub fn bins(&self) -> &[SpectrumBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpectrumBin> {
        self.bins.iter()
    }

    pub fn ks(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.k).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.power).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.error).collect()
    }

    /// Same spectrum with `k` expressed as multipole `ℓ = k · 13900` and
    /// power in µK².
    pub fn to_cmb_units(&self) -> BinnedSpectrum {
        let bins = self
            .bins
            .iter()
            .map(|bin| SpectrumBin {
                k: bin.k * DISTANCE_TO_LAST_SCATTERING,
                lower: bin.lower * DISTANCE_TO_LAST_SCATTERING,
                upper: bin.upper * DISTANCE_TO_LAST_SCATTERING,
                power: bin.power * MICRO_KELVIN_SQUARED,
                std_dev: bin.std_dev * MICRO_KELVIN_SQUARED,
                error: bin.error * MICRO_KELVIN_SQUARED,
                count: bin.count,
            })
            .collect();
        BinnedSpectrum {
            bins,
            raw: self.raw,
        }
    }
}

/// Binned spectrum plus the power-law fit through it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEstimate {
    pub bins: BinnedSpectrum,
    pub fit: PowerLawFit,
    pub raw: bool,
    pub pivot: f64,
}

impl SpectrumEstimate {
    pub fn amplitude(&self) -> f64 {
        self.fit.amplitude
    }

    pub fn tilt(&self) -> f64 {
        self.fit.tilt
    }
}

/// Estimator settings. Stateless between calls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumEstimator {
    pub bins: usize,
    pub raw: bool,
    pub pivot: f64,
}

impl Default for SpectrumEstimator {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            raw: false,
            pivot: DEFAULT_PIVOT,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }
}

impl SpectrumEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_pivot(mut self, pivot: f64) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn validate(&self) -> CosmosResult<()> {
        if self.bins < 3 {
            return Err(CosmosError::invalid(
                "bins",
                format!("at least 3 bins are needed for the fit, got {}", self.bins),
            ));
        }
        ensure_positive("pivot", self.pivot)
    }

    /// Bins the spectrum of `field` and fits the power law through it.
    pub fn estimate(&self, field: &SpectralField) -> CosmosResult<SpectrumEstimate> {
        self.validate()?;
        let (grid, fft) = plan_for(field)?;
        self.estimate_with(field, &grid, &fft)
    }

    /// [`estimate`](Self::estimate) with a grid and FFT plan prepared for
    /// `field`'s `(n, scale)`, e.g. those held by a realisation engine.
    pub fn estimate_with(
        &self,
        field: &SpectralField,
        grid: &KSpaceGrid,
        fft: &RealFft2,
    ) -> CosmosResult<SpectrumEstimate> {
        let bins = self.binned_with(field, grid, fft)?;
        let fit = fit_power_law(&bins.ks(), &bins.powers(), self.pivot)?;
        info!(
            target: "st_cosmos::estimator",
            bins = bins.len(),
            raw = self.raw,
            amplitude = fit.amplitude,
            tilt = fit.tilt,
            tilt_error = fit.tilt_error,
            "estimated power spectrum"
        );
        Ok(SpectrumEstimate {
            bins,
            fit,
            raw: self.raw,
            pivot: self.pivot,
        })
    }

    /// Binned spectrum only. Physical fields are transformed first.
    pub fn binned(&self, field: &SpectralField) -> CosmosResult<BinnedSpectrum> {
        self.validate()?;
        let (grid, fft) = plan_for(field)?;
        self.binned_with(field, &grid, &fft)
    }

    /// [`binned`](Self::binned) with a caller-held grid and FFT plan.
    pub fn binned_with(
        &self,
        field: &SpectralField,
        grid: &KSpaceGrid,
        fft: &RealFft2,
    ) -> CosmosResult<BinnedSpectrum> {
        self.validate()?;
        if grid.n() != field.n() || grid.scale() != field.scale() {
            return Err(CosmosError::invalid(
                "grid",
                format!(
                    "grid ({}, {}) does not match field ({}, {})",
                    grid.n(),
                    grid.scale(),
                    field.n(),
                    field.scale()
                ),
            ));
        }
        let transformed;
        let spectrum = match field.data() {
            FieldData::Frequency(values) => values,
            FieldData::Physical(_) => {
                transformed = field.forward_with(fft)?.into_frequency()?;
                &transformed
            }
        };

        let modes: Vec<(f64, f64)> = grid
            .magnitudes()
            .iter()
            .zip(spectrum.iter())
            .skip(1)
            .map(|(&k, x)| {
                let power = x.norm_sqr();
                (k, if self.raw { power } else { k * k * power })
            })
            .collect();

        if modes.len() < self.bins {
            return Err(CosmosError::DegenerateEstimation {
                reason: format!(
                    "{} bins requested but only {} modes are available",
                    self.bins,
                    modes.len()
                ),
            });
        }

        let lo = modes.iter().map(|m| m.0).fold(f64::INFINITY, f64::min);
        let hi = modes.iter().map(|m| m.0).fold(f64::NEG_INFINITY, f64::max);
        if hi <= lo {
            return Err(CosmosError::DegenerateEstimation {
                reason: format!("wavenumber range [{lo}, {hi}] is empty"),
            });
        }
        let width = (hi - lo) / self.bins as f64;

        let mut acc = vec![Accumulator::default(); self.bins];
        for &(k, power) in &modes {
            let index = (((k - lo) / width) as usize).min(self.bins - 1);
            acc[index].push(power);
        }

        let mut bins = Vec::with_capacity(self.bins);
        for (index, stats) in acc.iter().enumerate() {
            if stats.count == 0 {
                return Err(CosmosError::EmptyBin { index });
            }
            let std_dev = (stats.m2 / stats.count as f64).max(0.0).sqrt();
            let lower = lo + index as f64 * width;
            bins.push(SpectrumBin {
                k: lower + width / 2.0,
                lower,
                upper: lower + width,
                power: stats.mean,
                std_dev,
                error: std_dev / (stats.count as f64).sqrt(),
                count: stats.count,
            });
        }
        debug!(
            target: "st_cosmos::estimator",
            modes = modes.len(),
            bins = self.bins,
            k_min = lo,
            k_max = hi,
            "binned spectrum"
        );
        Ok(BinnedSpectrum {
            bins,
            raw: self.raw,
        })
    }
}

fn plan_for(field: &SpectralField) -> CosmosResult<(KSpaceGrid, RealFft2)> {
    Ok((field.k_grid()?, RealFft2::new(field.n())?))
}
