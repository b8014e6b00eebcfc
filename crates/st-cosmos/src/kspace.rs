// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Wavenumber magnitudes on the half-spectrum lattice of an `n × n` periodic
//! grid of physical side `scale`.
//!
//! Rows follow the circular ordering of a full complex transform
//! (`0, 1, …, n/2-1, -n/2, …, -1`), columns hold the non-negative horizontal
//! wavenumbers `0..=n/2` kept by a real-input transform. Both axes are spaced
//! by the fundamental `2π / scale`.

use crate::error::{ensure_grid_size, ensure_positive, CosmosResult};
use ndarray::{Array1, Array2};
use std::f64::consts::PI;

/// Radial wavenumber magnitude at every stored mode.
#[derive(Clone, Debug, PartialEq)]
pub struct KSpaceGrid {
    n: usize,
    scale: f64,
    vertical: Array1<f64>,
    horizontal: Array1<f64>,
    magnitudes: Array2<f64>,
}

impl KSpaceGrid {
    /// Builds the grid for side `n` (even, ≥ 2) and physical length `scale`.
    pub fn new(n: usize, scale: f64) -> CosmosResult<Self> {
        ensure_grid_size(n)?;
        ensure_positive("scale", scale)?;

        let fundamental = 2.0 * PI / scale;
        let half = n / 2;
        let vertical = Array1::from_shape_fn(n, |i| {
            let signed = if i < half {
                i as f64
            } else {
                i as f64 - n as f64
            };
            signed * fundamental
        });
        let horizontal = Array1::from_shape_fn(half + 1, |j| j as f64 * fundamental);
        let magnitudes = Array2::from_shape_fn((n, half + 1), |(i, j)| {
            vertical[i].hypot(horizontal[j])
        });

        Ok(Self {
            n,
            scale,
            vertical,
            horizontal,
            magnitudes,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// `|k|` for every stored mode, shape `n × (n/2 + 1)`.
    pub fn magnitudes(&self) -> &Array2<f64> {
        &self.magnitudes
    }

    /// Signed vertical wavenumbers in circular order.
    pub fn vertical(&self) -> &Array1<f64> {
        &self.vertical
    }

    /// Non-negative horizontal wavenumbers.
    pub fn horizontal(&self) -> &Array1<f64> {
        &self.horizontal
    }

    /// Smallest non-zero wavenumber, `2π / scale`.
    pub fn fundamental(&self) -> f64 {
        2.0 * PI / self.scale
    }

    /// Per-axis Nyquist wavenumber, `π n / scale`.
    pub fn nyquist(&self) -> f64 {
        PI * self.n as f64 / self.scale
    }

    /// Largest magnitude on the lattice (the Nyquist corner).
    pub fn max_magnitude(&self) -> f64 {
        self.nyquist() * std::f64::consts::SQRT_2
    }

    /// Shape of the half-spectrum arrays that pair with this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.n, self.n / 2 + 1)
    }
}
