// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Interpolating cubic spline with not-a-knot end conditions.
//!
//! Used to project transfer functions sampled on a coarse logarithmic lattice
//! onto the linear wavenumber lattice of a grid. Queries outside the sample
//! range continue the outermost cubic piece.

use crate::error::{CosmosError, CosmosResult};

#[derive(Clone, Debug)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot.
    curvature: Vec<f64>,
}

impl CubicSpline {
    /// Fits a spline through `(xs, ys)`. `xs` must be strictly increasing and
    /// hold at least four points.
    pub fn new(xs: &[f64], ys: &[f64]) -> CosmosResult<Self> {
        if xs.len() != ys.len() {
            return Err(CosmosError::ShapeMismatch {
                expected: vec![xs.len()],
                actual: vec![ys.len()],
            });
        }
        if xs.len() < 4 {
            return Err(CosmosError::invalid(
                "samples",
                format!("a cubic spline needs at least 4 points, got {}", xs.len()),
            ));
        }
        if let Some(index) = xs
            .iter()
            .chain(ys.iter())
            .position(|v| !v.is_finite())
        {
            return Err(CosmosError::invalid(
                "samples",
                format!("non-finite value at flat index {index}"),
            ));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CosmosError::invalid(
                "samples",
                "abscissae must be strictly increasing",
            ));
        }

        let curvature = not_a_knot_curvature(xs, ys);
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            curvature,
        })
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let last = self.xs.len() - 2;
        let i = self
            .xs
            .partition_point(|&knot| knot <= x)
            .saturating_sub(1)
            .min(last);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.curvature[i], self.curvature[i + 1]);
        let h = x1 - x0;
        let a = x1 - x;
        let b = x - x0;
        m0 * a * a * a / (6.0 * h)
            + m1 * b * b * b / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }
}

/// Solves for knot second derivatives. The end conditions (continuous third
/// derivative at the second and penultimate knots) are folded into the first
/// and last interior rows, leaving a tridiagonal system in `M_1..M_{n-2}`.
fn not_a_knot_curvature(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    let m = n - 2;
    let mut lower = vec![0.0; m];
    let mut diag = vec![0.0; m];
    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];

    for row in 0..m {
        let i = row + 1;
        lower[row] = h[i - 1];
        diag[row] = 2.0 * (h[i - 1] + h[i]);
        upper[row] = h[i];
        rhs[row] = 6.0 * (slope[i] - slope[i - 1]);
    }

    let (h0, h1) = (h[0], h[1]);
    diag[0] = 3.0 * h0 + 2.0 * h1 + h0 * h0 / h1;
    upper[0] = h1 - h0 * h0 / h1;
    lower[0] = 0.0;

    let (a, b) = (h[n - 3], h[n - 2]);
    diag[m - 1] = 2.0 * a + 3.0 * b + b * b / a;
    lower[m - 1] = a - b * b / a;
    upper[m - 1] = 0.0;

    let interior = solve_tridiagonal(&lower, &diag, &upper, &rhs);

    let mut curvature = vec![0.0; n];
    curvature[1..n - 1].copy_from_slice(&interior);
    curvature[0] = curvature[1] * (1.0 + h0 / h1) - curvature[2] * (h0 / h1);
    curvature[n - 1] = curvature[n - 2] * (1.0 + b / a) - curvature[n - 3] * (b / a);
    curvature
}

fn solve_tridiagonal(lower: &[f64], diag: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let m = diag.len();
    let mut c = vec![0.0; m];
    let mut d = vec![0.0; m];
    c[0] = upper[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..m {
        let denom = diag[i] - lower[i] * c[i - 1];
        c[i] = upper[i] / denom;
        d[i] = (rhs[i] - lower[i] * d[i - 1]) / denom;
    }
    let mut x = vec![0.0; m];
    x[m - 1] = d[m - 1];
    for i in (0..m - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    x
}
