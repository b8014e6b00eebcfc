// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Orthonormal 2-D real FFT over square grids.
//!
//! The forward transform maps a real `n × n` array onto its `n × (n/2 + 1)`
//! half spectrum (rows: full vertical frequencies, columns: non-negative
//! horizontal frequencies). Both directions are scaled by `1/n`, so the pair
//! is mutually inverse and conserves `Σ|x|²` against the implied full
//! spectrum. rustfft plans any length, so `n` only has to be even.

use crate::error::{ensure_grid_size, CosmosError, CosmosResult};
use ndarray::{Array2, ArrayView2, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// Forward/inverse rustfft plans for one grid size.
#[derive(Clone)]
pub struct RealFft2 {
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for RealFft2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealFft2").field("n", &self.n).finish()
    }
}

impl RealFft2 {
    pub fn new(n: usize) -> CosmosResult<Self> {
        ensure_grid_size(n)?;
        let mut planner = FftPlanner::<f64>::new();
        Ok(Self {
            n,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    fn norm(&self) -> f64 {
        1.0 / self.n as f64
    }

    /// Real `n × n` → half spectrum `n × (n/2 + 1)`.
    pub fn forward(&self, physical: ArrayView2<'_, f64>) -> CosmosResult<Array2<Complex64>> {
        let n = self.n;
        let half = n / 2;
        check_shape(physical.dim(), (n, n))?;

        let mut spectrum = Array2::<Complex64>::zeros((n, half + 1));
        let mut buf = vec![Complex64::default(); n];

        for (src, mut dst) in physical
            .axis_iter(Axis(0))
            .zip(spectrum.axis_iter_mut(Axis(0)))
        {
            for (slot, value) in buf.iter_mut().zip(src.iter()) {
                *slot = Complex64::new(*value, 0.0);
            }
            self.forward.process(&mut buf);
            for (j, out) in dst.iter_mut().enumerate() {
                *out = buf[j];
            }
        }

        let norm = self.norm();
        for mut column in spectrum.axis_iter_mut(Axis(1)) {
            for (slot, value) in buf.iter_mut().zip(column.iter()) {
                *slot = *value;
            }
            self.forward.process(&mut buf);
            for (out, value) in column.iter_mut().zip(buf.iter()) {
                *out = *value * norm;
            }
        }

        Ok(spectrum)
    }

    /// Half spectrum `n × (n/2 + 1)` → real `n × n`.
    ///
    /// Like any complex-to-real transform, the imaginary parts that a real
    /// signal cannot carry (horizontal zero and Nyquist entries after the
    /// vertical pass) are discarded.
    pub fn inverse(&self, spectrum: ArrayView2<'_, Complex64>) -> CosmosResult<Array2<f64>> {
        let n = self.n;
        let half = n / 2;
        check_shape(spectrum.dim(), (n, half + 1))?;

        let mut work = spectrum.to_owned();
        let mut buf = vec![Complex64::default(); n];

        for mut column in work.axis_iter_mut(Axis(1)) {
            for (slot, value) in buf.iter_mut().zip(column.iter()) {
                *slot = *value;
            }
            self.inverse.process(&mut buf);
            for (out, value) in column.iter_mut().zip(buf.iter()) {
                *out = *value;
            }
        }

        let norm = self.norm();
        let mut physical = Array2::<f64>::zeros((n, n));
        for (src, mut dst) in work.axis_iter(Axis(0)).zip(physical.axis_iter_mut(Axis(0))) {
            buf[0] = Complex64::new(src[0].re, 0.0);
            buf[half] = Complex64::new(src[half].re, 0.0);
            for j in 1..half {
                buf[j] = src[j];
                buf[n - j] = src[j].conj();
            }
            self.inverse.process(&mut buf);
            for (out, value) in dst.iter_mut().zip(buf.iter()) {
                *out = value.re * norm;
            }
        }

        Ok(physical)
    }
}

fn check_shape(actual: (usize, usize), expected: (usize, usize)) -> CosmosResult<()> {
    if actual != expected {
        return Err(CosmosError::ShapeMismatch {
            expected: vec![expected.0, expected.1],
            actual: vec![actual.0, actual.1],
        });
    }
    Ok(())
}
