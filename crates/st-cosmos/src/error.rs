// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::field::Domain;
use crate::transfer::TransferError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type CosmosResult<T> = Result<T, CosmosError>;

/// Errors raised by the grid, field, realisation and estimation layers.
#[derive(Debug, Error)]
pub enum CosmosError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("field is in the {actual:?} domain but {expected:?} was required")]
    WrongDomain { expected: Domain, actual: Domain },
    #[error("degenerate estimation: {reason}")]
    DegenerateEstimation { reason: String },
    #[error("k-bin {index} holds no modes")]
    EmptyBin { index: usize },
    #[error("power-law fit failed: {reason}")]
    FitFailed { reason: String },
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl CosmosError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        CosmosError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for the failures that stem from an estimation that cannot
    /// produce meaningful statistics.
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            CosmosError::DegenerateEstimation { .. }
                | CosmosError::EmptyBin { .. }
                | CosmosError::FitFailed { .. }
        )
    }
}

/// Checks that `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> CosmosResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CosmosError::invalid(
            name,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

/// Checks that a grid side length is even and at least two.
pub(crate) fn ensure_grid_size(n: usize) -> CosmosResult<()> {
    if n < 2 || n % 2 != 0 {
        return Err(CosmosError::invalid(
            "n",
            format!("grid size must be an even integer >= 2, got {n}"),
        ));
    }
    Ok(())
}
