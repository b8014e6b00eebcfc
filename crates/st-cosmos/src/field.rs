// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Domain-tagged field values.
//!
//! A [`SpectralField`] is either a real `n × n` map in physical space or its
//! `n × (n/2 + 1)` half spectrum. Transforms never mutate; they hand back a new
//! field in the other domain.

use crate::error::{ensure_grid_size, ensure_positive, CosmosError, CosmosResult};
use crate::fft::RealFft2;
use crate::kspace::KSpaceGrid;
use ndarray::Array2;
use num_complex::Complex64;

/// Which side of the transform a field lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Physical,
    Frequency,
}

/// Payload of a [`SpectralField`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldData {
    Physical(Array2<f64>),
    Frequency(Array2<Complex64>),
}

/// Square periodic field together with its grid metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralField {
    n: usize,
    scale: f64,
    data: FieldData,
}

impl SpectralField {
    /// Wraps a real square map of side length `scale`.
    pub fn physical(data: Array2<f64>, scale: f64) -> CosmosResult<Self> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(CosmosError::ShapeMismatch {
                expected: vec![rows, rows],
                actual: vec![rows, cols],
            });
        }
        ensure_grid_size(rows)?;
        ensure_positive("scale", scale)?;
        Ok(Self {
            n: rows,
            scale,
            data: FieldData::Physical(data),
        })
    }

    /// Wraps a half spectrum of an `n × n` real map.
    pub fn frequency(data: Array2<Complex64>, n: usize, scale: f64) -> CosmosResult<Self> {
        ensure_grid_size(n)?;
        ensure_positive("scale", scale)?;
        let expected = (n, n / 2 + 1);
        if data.dim() != expected {
            let (rows, cols) = data.dim();
            return Err(CosmosError::ShapeMismatch {
                expected: vec![expected.0, expected.1],
                actual: vec![rows, cols],
            });
        }
        Ok(Self {
            n,
            scale,
            data: FieldData::Frequency(data),
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn domain(&self) -> Domain {
        match self.data {
            FieldData::Physical(_) => Domain::Physical,
            FieldData::Frequency(_) => Domain::Frequency,
        }
    }

    pub fn data(&self) -> &FieldData {
        &self.data
    }

    pub fn shape(&self) -> (usize, usize) {
        match &self.data {
            FieldData::Physical(values) => values.dim(),
            FieldData::Frequency(values) => values.dim(),
        }
    }

    pub fn as_physical(&self) -> Option<&Array2<f64>> {
        match &self.data {
            FieldData::Physical(values) => Some(values),
            FieldData::Frequency(_) => None,
        }
    }

    pub fn as_frequency(&self) -> Option<&Array2<Complex64>> {
        match &self.data {
            FieldData::Frequency(values) => Some(values),
            FieldData::Physical(_) => None,
        }
    }

    /// Consumes the field, returning the real map if it is one.
    pub fn into_physical(self) -> CosmosResult<Array2<f64>> {
        match self.data {
            FieldData::Physical(values) => Ok(values),
            FieldData::Frequency(_) => Err(CosmosError::WrongDomain {
                expected: Domain::Physical,
                actual: Domain::Frequency,
            }),
        }
    }

    /// Consumes the field, returning the half spectrum if it is one.
    pub fn into_frequency(self) -> CosmosResult<Array2<Complex64>> {
        match self.data {
            FieldData::Frequency(values) => Ok(values),
            FieldData::Physical(_) => Err(CosmosError::WrongDomain {
                expected: Domain::Frequency,
                actual: Domain::Physical,
            }),
        }
    }

    /// Physical → frequency with a freshly planned transform.
    pub fn forward(&self) -> CosmosResult<Self> {
        self.forward_with(&RealFft2::new(self.n)?)
    }

    /// Physical → frequency reusing `fft`.
    pub fn forward_with(&self, fft: &RealFft2) -> CosmosResult<Self> {
        let values = match &self.data {
            FieldData::Physical(values) => values,
            FieldData::Frequency(_) => {
                return Err(CosmosError::WrongDomain {
                    expected: Domain::Physical,
                    actual: Domain::Frequency,
                })
            }
        };
        self.ensure_plan(fft)?;
        Ok(Self {
            n: self.n,
            scale: self.scale,
            data: FieldData::Frequency(fft.forward(values.view())?),
        })
    }

    /// Frequency → physical with a freshly planned transform.
    pub fn inverse(&self) -> CosmosResult<Self> {
        self.inverse_with(&RealFft2::new(self.n)?)
    }

    /// Frequency → physical reusing `fft`.
    pub fn inverse_with(&self, fft: &RealFft2) -> CosmosResult<Self> {
        let values = match &self.data {
            FieldData::Frequency(values) => values,
            FieldData::Physical(_) => {
                return Err(CosmosError::WrongDomain {
                    expected: Domain::Frequency,
                    actual: Domain::Physical,
                })
            }
        };
        self.ensure_plan(fft)?;
        Ok(Self {
            n: self.n,
            scale: self.scale,
            data: FieldData::Physical(fft.inverse(values.view())?),
        })
    }

    fn ensure_plan(&self, fft: &RealFft2) -> CosmosResult<()> {
        if fft.n() != self.n {
            return Err(CosmosError::ShapeMismatch {
                expected: vec![self.n],
                actual: vec![fft.n()],
            });
        }
        Ok(())
    }

    /// Wavenumber magnitudes matching this field's grid.
    pub fn k_grid(&self) -> CosmosResult<KSpaceGrid> {
        KSpaceGrid::new(self.n, self.scale)
    }

    /// Log-spaced wavenumbers covering the grid's dynamic range, rounded out
    /// to whole decades: from `10^floor(log10(2π/scale))` to
    /// `10^ceil(log10(πn/scale))` with `per_decade` samples per decade.
    ///
    /// These are the points handed to a transfer-function provider.
    pub fn sample_wavenumbers(&self, per_decade: usize) -> CosmosResult<Vec<f64>> {
        if per_decade == 0 {
            return Err(CosmosError::invalid(
                "per_decade",
                "at least one sample per decade is required",
            ));
        }
        let grid = self.k_grid()?;
        let lo = grid.fundamental().log10().floor() as i32;
        let mut hi = grid.nyquist().log10().ceil() as i32;
        if hi <= lo {
            hi = lo + 1;
        }
        let count = per_decade * (hi - lo) as usize + 1;
        let step = 1.0 / per_decade as f64;
        Ok((0..count)
            .map(|i| 10f64.powf(lo as f64 + i as f64 * step))
            .collect())
    }

    /// Sum of squared amplitudes. For spectra the columns that stand in for
    /// their conjugate partners are counted twice, so under the orthonormal
    /// transform both domains report the same number.
    pub fn total_power(&self) -> f64 {
        match &self.data {
            FieldData::Physical(values) => values.iter().map(|v| v * v).sum(),
            FieldData::Frequency(values) => {
                let half = self.n / 2;
                values
                    .indexed_iter()
                    .map(|((_, j), v)| {
                        let weight = if j == 0 || j == half { 1.0 } else { 2.0 };
                        weight * v.norm_sqr()
                    })
                    .sum()
            }
        }
    }

    /// Spatial mean of a physical field.
    pub fn mean(&self) -> CosmosResult<f64> {
        match &self.data {
            FieldData::Physical(values) => Ok(values.sum() / values.len() as f64),
            FieldData::Frequency(_) => Err(CosmosError::WrongDomain {
                expected: Domain::Physical,
                actual: Domain::Frequency,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn checker(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(i, j)| {
            (i as f64 * 0.7).cos() - (j as f64 * 1.3).sin() + ((i + j) % 3) as f64
        })
    }

    #[test]
    fn rejects_bad_shapes() {
        let err = SpectralField::physical(Array2::zeros((4, 6)), 1.0).unwrap_err();
        assert!(matches!(err, CosmosError::ShapeMismatch { .. }));
        let err = SpectralField::physical(Array2::zeros((5, 5)), 1.0).unwrap_err();
        assert!(matches!(err, CosmosError::InvalidParameter { .. }));
        let err = SpectralField::frequency(Array2::zeros((8, 8)), 8, 1.0).unwrap_err();
        assert!(matches!(err, CosmosError::ShapeMismatch { .. }));
        assert!(SpectralField::frequency(Array2::zeros((8, 5)), 8, 1.0).is_ok());
    }

    #[test]
    fn transforms_reject_wrong_domain() {
        let field = SpectralField::physical(checker(4), 1.0).unwrap();
        let err = field.inverse().unwrap_err();
        assert!(matches!(
            err,
            CosmosError::WrongDomain {
                expected: Domain::Frequency,
                actual: Domain::Physical
            }
        ));
        let spectrum = field.forward().unwrap();
        assert_eq!(spectrum.domain(), Domain::Frequency);
        assert!(spectrum.forward().is_err());
        assert!(spectrum.mean().is_err());
    }

    #[test]
    fn forward_then_inverse_restores_values() {
        for n in [4usize, 8, 12] {
            let original = checker(n);
            let field = SpectralField::physical(original.clone(), 250.0).unwrap();
            let back = field.forward().unwrap().inverse().unwrap();
            assert_eq!(back.scale(), 250.0);
            for (a, b) in original.iter().zip(back.as_physical().unwrap().iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn power_matches_across_domains() {
        let field = SpectralField::physical(checker(8), 1.0).unwrap();
        let spectrum = field.forward().unwrap();
        assert_relative_eq!(field.total_power(), spectrum.total_power(), max_relative = 1e-10);
    }

    #[test]
    fn sample_wavenumbers_cover_whole_decades() {
        let field = SpectralField::physical(Array2::zeros((64, 64)), 1000.0).unwrap();
        let ks = field.sample_wavenumbers(10).unwrap();
        // 2π/1000 ≈ 6.3e-3 → 1e-3, 64π/1000 ≈ 0.2 → 1e0
        assert_eq!(ks.len(), 31);
        assert_relative_eq!(ks[0], 1e-3, max_relative = 1e-12);
        assert_relative_eq!(ks[30], 1.0, max_relative = 1e-12);
        assert_relative_eq!(ks[10], 1e-2, max_relative = 1e-12);
        assert!(ks.windows(2).all(|w| w[1] > w[0]));
        assert!(field.sample_wavenumbers(0).is_err());
    }
}
