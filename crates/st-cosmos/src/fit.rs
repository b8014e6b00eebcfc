// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Least-squares fit of `A · (k / k_p)^b` to binned power.
//!
//! The starting point comes from a straight line in log-log space; it is then
//! refined with Levenberg–Marquardt on the unweighted residuals. The reported
//! covariance is `(JᵀJ)⁻¹ · SSE / (n − 2)`.

use crate::error::{ensure_positive, CosmosError, CosmosResult};
use crate::power::SPECTRUM_NORMALISATION;
use serde::{Deserialize, Serialize};

const MAX_ITERATIONS: usize = 500;
const STEP_TOLERANCE: f64 = 1e-10;
const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e16;

/// Outcome of [`fit_power_law`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    /// `A_s = A / 2π²`.
    pub amplitude: f64,
    /// `n_s = b + 1`.
    pub tilt: f64,
    /// One-sigma error on `amplitude`.
    pub amplitude_error: f64,
    /// One-sigma error on `tilt`.
    pub tilt_error: f64,
    pub pivot: f64,
    /// Raw fitted coefficient `A`.
    pub coefficient: f64,
    /// Raw fitted exponent `b`.
    pub exponent: f64,
    /// Covariance of `(A, b)`.
    pub covariance: [[f64; 2]; 2],
    pub iterations: usize,
    /// Sum of squared residuals at the optimum.
    pub residual: f64,
}

impl PowerLawFit {
    /// Fitted model `A · (k / k_p)^b`, in the units of the fitted data.
    pub fn evaluate(&self, k: f64) -> f64 {
        self.coefficient * (k / self.pivot).powf(self.exponent)
    }
}

#[derive(Clone, Copy)]
struct Normal {
    jtj: [[f64; 2]; 2],
    jtr: [f64; 2],
    sse: f64,
}

fn sse(xs: &[f64], ys: &[f64], a: f64, b: f64) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - a * x.powf(b);
            r * r
        })
        .sum()
}

fn normal_equations(xs: &[f64], ys: &[f64], a: f64, b: f64) -> Normal {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];
    let mut sse = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let power = x.powf(b);
        let model = a * power;
        let j = [power, model * x.ln()];
        let r = y - model;
        for row in 0..2 {
            jtr[row] += j[row] * r;
            for col in 0..2 {
                jtj[row][col] += j[row] * j[col];
            }
        }
        sse += r * r;
    }
    Normal { jtj, jtr, sse }
}

/// Determinant of `m`, or `None` when it is numerically singular.
fn determinant(m: [[f64; 2]; 2]) -> Option<f64> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let scale = (m[0][0] * m[1][1]).abs();
    if !det.is_finite() || scale == 0.0 || det.abs() <= 1e-14 * scale {
        return None;
    }
    Some(det)
}

fn solve(m: [[f64; 2]; 2], rhs: [f64; 2]) -> Option<[f64; 2]> {
    let det = determinant(m)?;
    Some([
        (rhs[0] * m[1][1] - m[0][1] * rhs[1]) / det,
        (m[0][0] * rhs[1] - m[1][0] * rhs[0]) / det,
    ])
}

/// Straight line through `(ln x, ln y)` over the positive samples.
fn initial_guess(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let points: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|&(_, &y)| y > 0.0)
        .map(|(&x, &y)| (x.ln(), y.ln()))
        .collect();
    if points.len() < 2 {
        let mean = ys.iter().sum::<f64>() / ys.len() as f64;
        return (mean, 0.0);
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in &points {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    ((mean_y - slope * mean_x).exp(), slope)
}

/// Fits `A · (k / pivot)^b` to `(ks, ys)`.
///
/// Needs at least three points so the covariance has a residual degree of
/// freedom. Fails with [`CosmosError::FitFailed`] if the iteration does not
/// settle or the normal matrix at the optimum is singular.
pub fn fit_power_law(ks: &[f64], ys: &[f64], pivot: f64) -> CosmosResult<PowerLawFit> {
    if ks.len() != ys.len() {
        return Err(CosmosError::ShapeMismatch {
            expected: vec![ks.len()],
            actual: vec![ys.len()],
        });
    }
    if ks.len() < 3 {
        return Err(CosmosError::invalid(
            "samples",
            format!("a two-parameter fit needs at least 3 points, got {}", ks.len()),
        ));
    }
    ensure_positive("pivot", pivot)?;
    if ks.iter().any(|k| !(k.is_finite() && *k > 0.0)) {
        return Err(CosmosError::invalid("ks", "wavenumbers must be finite and positive"));
    }
    if ys.iter().any(|y| !y.is_finite()) {
        return Err(CosmosError::invalid("ys", "values must be finite"));
    }

    let xs: Vec<f64> = ks.iter().map(|k| k / pivot).collect();
    let (mut a, mut b) = initial_guess(&xs, ys);
    let mut lambda = INITIAL_DAMPING;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let normal = normal_equations(&xs, ys, a, b);
        let mut damped = normal.jtj;
        damped[0][0] *= 1.0 + lambda;
        damped[1][1] *= 1.0 + lambda;
        let Some([da, db]) = solve(damped, normal.jtr) else {
            return Err(CosmosError::FitFailed {
                reason: format!("singular normal matrix at iteration {iterations}"),
            });
        };

        let small = da.abs() <= STEP_TOLERANCE * a.abs().max(f64::MIN_POSITIVE)
            && db.abs() <= STEP_TOLERANCE * (1.0 + b.abs());
        let trial = sse(&xs, ys, a + da, b + db);
        if trial.is_finite() && trial <= normal.sse {
            a += da;
            b += db;
            lambda = (lambda * 0.3).max(1e-12);
        } else {
            lambda *= 10.0;
        }
        if small {
            converged = true;
            break;
        }
        if lambda > MAX_DAMPING {
            // no downhill step left at any damping
            converged = true;
            break;
        }
    }

    if !converged || !a.is_finite() || !b.is_finite() {
        return Err(CosmosError::FitFailed {
            reason: format!("no convergence after {iterations} iterations"),
        });
    }

    let normal = normal_equations(&xs, ys, a, b);
    let det = determinant(normal.jtj).ok_or_else(|| CosmosError::FitFailed {
        reason: "normal matrix is singular at the optimum".to_string(),
    })?;
    let variance = normal.sse / (xs.len() - 2) as f64;
    let covariance = [
        [normal.jtj[1][1] / det * variance, -normal.jtj[0][1] / det * variance],
        [-normal.jtj[1][0] / det * variance, normal.jtj[0][0] / det * variance],
    ];

    Ok(PowerLawFit {
        amplitude: a / SPECTRUM_NORMALISATION,
        tilt: b + 1.0,
        amplitude_error: covariance[0][0].max(0.0).sqrt() / SPECTRUM_NORMALISATION,
        tilt_error: covariance[1][1].max(0.0).sqrt(),
        pivot,
        coefficient: a,
        exponent: b,
        covariance,
        iterations,
        residual: normal.sse,
    })
}
