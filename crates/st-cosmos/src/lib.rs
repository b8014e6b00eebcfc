// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gaussian random-field realisations on a periodic 2-D grid.
//!
//! [`FieldRealisation`] draws a field whose Fourier modes follow a
//! scale-invariant primordial spectrum, then evolves that baseline through
//! transfer functions supplied by any [`TransferProvider`].
//! [`SpectrumEstimator`] goes the other way: it bins the power of a field and
//! fits amplitude and tilt back out of it.
//!
//! ```no_run
//! use st_cosmos::{FieldRealisation, RealisationConfig, SpectrumEstimator};
//!
//! # fn main() -> st_cosmos::CosmosResult<()> {
//! let mut engine = FieldRealisation::new(RealisationConfig::new(256, 1000.0).with_seed(7))?;
//! let field = engine.build_default_baseline()?.clone();
//! let estimate = SpectrumEstimator::new().estimate(&field)?;
//! println!("n_s = {:.3} ± {:.3}", estimate.tilt(), estimate.fit.tilt_error);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod fft;
pub mod field;
pub mod fit;
pub mod kspace;
pub mod power;
pub mod realisation;
pub mod spline;
pub mod telemetry;
pub mod transfer;

pub use config::RealisationConfig;
pub use error::{CosmosError, CosmosResult};
pub use estimator::{BinnedSpectrum, SpectrumBin, SpectrumEstimate, SpectrumEstimator};
pub use fft::RealFft2;
pub use field::{Domain, FieldData, SpectralField};
pub use fit::{fit_power_law, PowerLawFit};
pub use kspace::KSpaceGrid;
pub use power::{PowerSpectrumParams, ScaleInvariantSpectrum};
pub use realisation::{enforce_real_symmetry, FieldRealisation};
pub use spline::CubicSpline;
pub use telemetry::TelemetryState;
pub use transfer::{
    CachedTransfer, FnTransfer, TabulatedTransfer, TransferError, TransferProvider,
    TransferTable, MONOPOLE,
};
