// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gaussian realisations of the scale-invariant spectrum and their evolution
//! through transfer functions.
//!
//! The engine keeps two physical fields apart: the *baseline*, frozen right
//! after a realisation is drawn, and the *current* field produced by the most
//! recent evolution step. Every evolution step starts again from the
//! baseline, so a sequence of times describes one underlying draw.

use crate::config::RealisationConfig;
use crate::error::{CosmosError, CosmosResult};
use crate::estimator::{SpectrumEstimate, SpectrumEstimator};
use crate::fft::RealFft2;
use crate::field::{Domain, SpectralField};
use crate::kspace::KSpaceGrid;
use crate::power::{PowerSpectrumParams, ScaleInvariantSpectrum};
use crate::spline::CubicSpline;
use crate::transfer::TransferProvider;
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::SQRT_2;
use tracing::{debug, info};

const RNG_LABEL: &str = "st-cosmos/realisation";

/// Realisation engine for one `(n, scale)` grid.
#[derive(Debug)]
pub struct FieldRealisation {
    config: RealisationConfig,
    grid: KSpaceGrid,
    fft: RealFft2,
    rng: StdRng,
    frequency_field: Option<SpectralField>,
    physical_field: Option<SpectralField>,
    baseline: Option<SpectralField>,
}

impl FieldRealisation {
    pub fn new(config: RealisationConfig) -> CosmosResult<Self> {
        config.validate()?;
        let grid = KSpaceGrid::new(config.n, config.scale)?;
        let fft = RealFft2::new(config.n)?;
        let rng = spiral_config::determinism::rng_from_optional(config.seed, RNG_LABEL);
        Ok(Self {
            config,
            grid,
            fft,
            rng,
            frequency_field: None,
            physical_field: None,
            baseline: None,
        })
    }

    /// Engine whose baseline is an existing physical field instead of a draw.
    pub fn from_baseline(config: RealisationConfig, baseline: SpectralField) -> CosmosResult<Self> {
        if baseline.domain() != Domain::Physical {
            return Err(CosmosError::WrongDomain {
                expected: Domain::Physical,
                actual: baseline.domain(),
            });
        }
        if baseline.n() != config.n || baseline.scale() != config.scale {
            return Err(CosmosError::invalid(
                "baseline",
                format!(
                    "grid ({}, {}) does not match config ({}, {})",
                    baseline.n(),
                    baseline.scale(),
                    config.n,
                    config.scale
                ),
            ));
        }
        let mut engine = Self::new(config)?;
        engine.frequency_field = Some(baseline.forward_with(&engine.fft)?);
        engine.physical_field = Some(baseline.clone());
        engine.baseline = Some(baseline);
        Ok(engine)
    }

    pub fn config(&self) -> &RealisationConfig {
        &self.config
    }

    pub fn grid(&self) -> &KSpaceGrid {
        &self.grid
    }

    /// Spectrum of the most recent realisation or evolution step.
    pub fn frequency_field(&self) -> Option<&SpectralField> {
        self.frequency_field.as_ref()
    }

    /// Physical map of the most recent realisation or evolution step.
    pub fn physical_field(&self) -> Option<&SpectralField> {
        self.physical_field.as_ref()
    }

    /// Untouched realisation every evolution step starts from.
    pub fn baseline(&self) -> Option<&SpectralField> {
        self.baseline.as_ref()
    }

    /// Per-mode standard deviation `sqrt(P/2)`: the real and imaginary parts
    /// of each complex mode each carry half of the target variance.
    pub fn sigma_matrix(&self, params: PowerSpectrumParams) -> CosmosResult<Array2<f64>> {
        let model = ScaleInvariantSpectrum::new(params)?;
        Ok(model.power_grid(&self.grid).mapv(|p| (p / 2.0).sqrt()))
    }

    fn complex_gaussian(&mut self) -> Array2<Complex64> {
        let shape = self.grid.shape();
        let rng = &mut self.rng;
        let real: Array2<f64> = Array2::from_shape_fn(shape, |_| StandardNormal.sample(rng));
        let imag: Array2<f64> = Array2::from_shape_fn(shape, |_| StandardNormal.sample(rng));
        let mut draw = Array2::<Complex64>::zeros(shape);
        ndarray::Zip::from(&mut draw)
            .and(&real)
            .and(&imag)
            .for_each(|z, &re, &im| *z = Complex64::new(re, im));
        draw
    }

    /// Draws a new baseline for `params`, replacing any previous one.
    pub fn build_baseline(&mut self, params: PowerSpectrumParams) -> CosmosResult<&SpectralField> {
        let sigma = self.sigma_matrix(params)?;
        let mut spectrum = self.complex_gaussian();
        spectrum.zip_mut_with(&sigma, |z, &s| *z *= s);
        enforce_real_symmetry(&mut spectrum)?;

        let frequency = SpectralField::frequency(spectrum, self.config.n, self.config.scale)?;
        let physical = frequency.inverse_with(&self.fft)?;
        info!(
            target: "st_cosmos::realisation",
            n = self.config.n,
            scale = self.config.scale,
            amplitude = params.amplitude,
            tilt = params.tilt,
            pivot = params.pivot,
            "built scale-invariant baseline"
        );

        self.baseline = Some(physical.clone());
        self.frequency_field = Some(frequency);
        Ok(&*self.physical_field.insert(physical))
    }

    /// [`build_baseline`](Self::build_baseline) with the configured spectrum.
    pub fn build_default_baseline(&mut self) -> CosmosResult<&SpectralField> {
        let params = self.config.spectrum;
        self.build_baseline(params)
    }

    fn ensure_baseline(&mut self) -> CosmosResult<()> {
        if self.baseline.is_none() {
            debug!(
                target: "st_cosmos::realisation",
                "no baseline yet; drawing one with the configured spectrum"
            );
            self.build_default_baseline()?;
        }
        Ok(())
    }

    fn baseline_field(&self) -> CosmosResult<&SpectralField> {
        self.baseline.as_ref().ok_or_else(|| {
            CosmosError::invalid("baseline", "baseline build did not retain a field")
        })
    }

    /// Wavenumbers at which transfer functions are requested. Draws the
    /// default baseline first if none exists.
    pub fn sample_wavenumbers(&mut self) -> CosmosResult<Vec<f64>> {
        self.ensure_baseline()?;
        self.baseline_field()?
            .sample_wavenumbers(self.config.samples_per_decade)
    }

    /// Spectrum estimate of the current field, reusing this engine's grid and
    /// FFT plan. Draws the default baseline first if nothing has been realised.
    pub fn estimate_spectrum(
        &mut self,
        estimator: &SpectrumEstimator,
    ) -> CosmosResult<SpectrumEstimate> {
        self.ensure_baseline()?;
        let field = self
            .physical_field
            .as_ref()
            .ok_or_else(|| CosmosError::invalid("field", "engine holds no current field"))?;
        estimator.estimate_with(field, &self.grid, &self.fft)
    }

    /// Evolves the baseline to `time` using transfer values from `provider`.
    /// `source` falls back to the configured one.
    pub fn evolve<P>(
        &mut self,
        time: f64,
        source: Option<&str>,
        provider: &P,
    ) -> CosmosResult<&SpectralField>
    where
        P: TransferProvider + ?Sized,
    {
        let ks = self.sample_wavenumbers()?;
        let source = source.unwrap_or(&self.config.source).to_string();
        let table = provider.transfer_table(&ks, &[time], &source)?;
        table.ensure_shape(ks.len(), 1)?;
        let raw = table.slice(0, 0)?;
        debug!(
            target: "st_cosmos::realisation",
            time,
            source = %source,
            samples = ks.len(),
            "evolving baseline"
        );
        self.apply_transfer(&ks, &raw)
    }

    /// Evolves the baseline with transfer values already sampled at
    /// [`sample_wavenumbers`](Self::sample_wavenumbers).
    pub fn evolve_with_transfer(&mut self, raw: &[f64]) -> CosmosResult<&SpectralField> {
        let ks = self.sample_wavenumbers()?;
        self.apply_transfer(&ks, raw)
    }

    /// Evolves the baseline to every time in `times` with a single batched
    /// provider request and returns the physical map of each step in order.
    /// The engine is left holding the last step.
    pub fn evolve_series<P>(
        &mut self,
        times: &[f64],
        source: Option<&str>,
        provider: &P,
    ) -> CosmosResult<Vec<SpectralField>>
    where
        P: TransferProvider + ?Sized,
    {
        let ks = self.sample_wavenumbers()?;
        let source = source.unwrap_or(&self.config.source).to_string();
        let table = provider.transfer_table(&ks, times, &source)?;
        table.ensure_shape(ks.len(), times.len())?;

        let mut frames = Vec::with_capacity(times.len());
        for (index, time) in times.iter().enumerate() {
            let raw = table.slice(index, 0)?;
            debug!(target: "st_cosmos::realisation", time, step = index, "evolving series step");
            frames.push(self.apply_transfer(&ks, &raw)?.clone());
        }
        info!(
            target: "st_cosmos::realisation",
            steps = frames.len(),
            source = %source,
            "evolved realisation series"
        );
        Ok(frames)
    }

    fn apply_transfer(&mut self, ks: &[f64], raw: &[f64]) -> CosmosResult<&SpectralField> {
        if raw.len() != ks.len() {
            return Err(CosmosError::ShapeMismatch {
                expected: vec![ks.len()],
                actual: vec![raw.len()],
            });
        }
        let spline = CubicSpline::new(ks, raw)?;
        let transfer = self.grid.magnitudes().mapv(|k| spline.evaluate(k));

        self.ensure_baseline()?;
        let mut spectrum = self
            .baseline_field()?
            .forward_with(&self.fft)?
            .into_frequency()?;
        spectrum.zip_mut_with(&transfer, |z, &t| *z *= t);

        let frequency = SpectralField::frequency(spectrum, self.config.n, self.config.scale)?;
        let physical = frequency.inverse_with(&self.fft)?;
        self.frequency_field = Some(frequency);
        Ok(&*self.physical_field.insert(physical))
    }
}

/// Makes a half spectrum the transform of a real field.
///
/// * the mean mode `(0, 0)` is zeroed;
/// * the self-conjugate modes `(n/2, 0)`, `(0, n/2)` and `(n/2, n/2)` keep
///   `√2 · Re`, preserving their expected power;
/// * in the horizontal-zero and horizontal-Nyquist columns, rows
///   `n/2+1..n` become the conjugates of rows `n/2-1..1`.
pub fn enforce_real_symmetry(spectrum: &mut Array2<Complex64>) -> CosmosResult<()> {
    let (n, cols) = spectrum.dim();
    let half = n / 2;
    if n < 2 || n % 2 != 0 || cols != half + 1 {
        return Err(CosmosError::ShapeMismatch {
            expected: vec![n, half + 1],
            actual: vec![n, cols],
        });
    }

    spectrum[[0, 0]] = Complex64::new(0.0, 0.0);
    for (i, j) in [(half, 0), (0, half), (half, half)] {
        let re = spectrum[[i, j]].re;
        spectrum[[i, j]] = Complex64::new(re * SQRT_2, 0.0);
    }
    for col in [0, half] {
        for i in half + 1..n {
            spectrum[[i, col]] = spectrum[[n - i, col]].conj();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{FnTransfer, TransferError, TransferTable, MONOPOLE};
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn engine(n: usize, seed: u64) -> FieldRealisation {
        FieldRealisation::new(
            RealisationConfig::new(n, 1000.0)
                .with_seed(seed)
                .with_samples_per_decade(20),
        )
        .unwrap()
    }

    fn max_abs_diff(a: &SpectralField, b: &SpectralField) -> f64 {
        a.as_physical()
            .unwrap()
            .iter()
            .zip(b.as_physical().unwrap().iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn symmetry_holds_on_realised_spectrum() {
        let mut engine = engine(16, 11);
        engine.build_default_baseline().unwrap();
        let spectrum = engine.frequency_field().unwrap().as_frequency().unwrap();
        let n = 16;
        let half = n / 2;
        assert_eq!(spectrum[[0, 0]], Complex64::new(0.0, 0.0));
        for (i, j) in [(half, 0), (0, half), (half, half)] {
            assert_eq!(spectrum[[i, j]].im, 0.0);
        }
        for col in [0, half] {
            for i in 1..half {
                assert_eq!(spectrum[[n - i, col]], spectrum[[i, col]].conj());
            }
        }
    }

    #[test]
    fn inverse_of_realised_spectrum_round_trips() {
        let mut engine = engine(16, 5);
        engine.build_default_baseline().unwrap();
        let spectrum = engine.frequency_field().unwrap().clone();
        let again = engine.physical_field().unwrap().forward().unwrap();
        for (a, b) in spectrum
            .as_frequency()
            .unwrap()
            .iter()
            .zip(again.as_frequency().unwrap().iter())
        {
            assert!((a - b).norm() < 1e-12 * (1.0 + a.norm()));
        }
    }

    #[test]
    fn physical_baseline_has_zero_mean() {
        let mut engine = engine(32, 3);
        let field = engine.build_default_baseline().unwrap().clone();
        assert_eq!(field.shape(), (32, 32));
        let values = field.as_physical().unwrap();
        let rms = (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt();
        assert!(rms > 0.0);
        assert!(field.mean().unwrap().abs() < 1e-12 * rms);
        assert_eq!(engine.baseline(), Some(&field));
    }

    #[test]
    fn same_seed_same_realisation() {
        let mut a = engine(16, 99);
        let mut b = engine(16, 99);
        let mut c = engine(16, 100);
        let fa = a.build_default_baseline().unwrap().clone();
        let fb = b.build_default_baseline().unwrap().clone();
        let fc = c.build_default_baseline().unwrap().clone();
        assert_eq!(fa, fb);
        assert_ne!(fa, fc);
    }

    #[test]
    fn unit_transfer_reproduces_baseline() {
        let mut engine = engine(16, 8);
        let baseline = engine.build_default_baseline().unwrap().clone();
        let ks = engine.sample_wavenumbers().unwrap();
        let ones = vec![1.0; ks.len()];
        let evolved = engine.evolve_with_transfer(&ones).unwrap().clone();
        assert!(max_abs_diff(&baseline, &evolved) < 1e-12 * 1e-3);
    }

    #[test]
    fn constant_transfer_scales_field() {
        let mut engine = engine(16, 8);
        let baseline = engine.build_default_baseline().unwrap().clone();
        let provider = FnTransfer::new(MONOPOLE, |_, _| -0.5);
        let evolved = engine.evolve(10.0, None, &provider).unwrap().clone();
        for (b, e) in baseline
            .as_physical()
            .unwrap()
            .iter()
            .zip(evolved.as_physical().unwrap().iter())
        {
            assert_relative_eq!(*e, -0.5 * b, epsilon = 1e-18, max_relative = 1e-9);
        }
    }

    #[test]
    fn evolution_never_compounds() {
        let provider = FnTransfer::new(MONOPOLE, |k, t| (k * t).cos() * (-k * 10.0).exp());

        let mut shared = engine(16, 21);
        shared.build_default_baseline().unwrap();
        let first = shared.evolve(50.0, None, &provider).unwrap().clone();
        let second = shared.evolve(120.0, None, &provider).unwrap().clone();

        let mut fresh_a = engine(16, 21);
        fresh_a.build_default_baseline().unwrap();
        let expected_first = fresh_a.evolve(50.0, None, &provider).unwrap().clone();

        let mut fresh_b = engine(16, 21);
        fresh_b.build_default_baseline().unwrap();
        let expected_second = fresh_b.evolve(120.0, None, &provider).unwrap().clone();

        assert_eq!(first, expected_first);
        assert_eq!(second, expected_second);
        assert_ne!(first, second);
        assert_eq!(shared.baseline(), fresh_b.baseline());
    }

    #[test]
    fn evolve_without_baseline_draws_default() {
        let mut engine = engine(8, 2);
        assert!(engine.baseline().is_none());
        let provider = FnTransfer::new(MONOPOLE, |_, _| 1.0);
        engine.evolve(1.0, Some(MONOPOLE), &provider).unwrap();
        assert!(engine.baseline().is_some());
        assert!(engine.physical_field().is_some());
    }

    #[test]
    fn mismatched_transfer_length_is_fatal() {
        let mut engine = engine(8, 2);
        let ks = engine.sample_wavenumbers().unwrap();
        let err = engine.evolve_with_transfer(&vec![1.0; ks.len() - 1]).unwrap_err();
        assert!(matches!(err, CosmosError::ShapeMismatch { .. }));
    }

    struct Failing;

    impl TransferProvider for Failing {
        fn transfer_table(
            &self,
            _wavenumbers: &[f64],
            _times: &[f64],
            _source: &str,
        ) -> Result<TransferTable, TransferError> {
            Err(TransferError::Provider("solver diverged".into()))
        }
    }

    struct Truncating;

    impl TransferProvider for Truncating {
        fn transfer_table(
            &self,
            wavenumbers: &[f64],
            times: &[f64],
            _source: &str,
        ) -> Result<TransferTable, TransferError> {
            Ok(TransferTable::new(ndarray::Array3::ones((
                wavenumbers.len() - 1,
                times.len(),
                1,
            ))))
        }
    }

    #[test]
    fn collaborator_failures_propagate() {
        let mut engine = engine(8, 2);
        let err = engine.evolve(1.0, None, &Failing).unwrap_err();
        assert!(matches!(
            err,
            CosmosError::Transfer(TransferError::Provider(_))
        ));
        let err = engine.evolve(1.0, None, &Truncating).unwrap_err();
        assert!(matches!(
            err,
            CosmosError::Transfer(TransferError::TableShape { .. })
        ));
    }

    struct Counting<'a> {
        calls: &'a Cell<usize>,
    }

    impl TransferProvider for Counting<'_> {
        fn transfer_table(
            &self,
            wavenumbers: &[f64],
            times: &[f64],
            _source: &str,
        ) -> Result<TransferTable, TransferError> {
            self.calls.set(self.calls.get() + 1);
            Ok(TransferTable::new(ndarray::Array3::from_shape_fn(
                (wavenumbers.len(), times.len(), 1),
                |(i, j, _)| (wavenumbers[i] * times[j]).sin() + 1.5,
            )))
        }
    }

    #[test]
    fn series_uses_one_request_and_matches_single_steps() {
        let calls = Cell::new(0);
        let provider = Counting { calls: &calls };
        let times = [1.0, 5.0, 25.0];

        let mut engine_a = engine(8, 4);
        let frames = engine_a.evolve_series(&times, None, &provider).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(calls.get(), 1);
        assert_eq!(engine_a.physical_field(), frames.last());

        let mut engine_b = engine(8, 4);
        for (time, frame) in times.iter().zip(frames.iter()) {
            let single = engine_b.evolve(*time, None, &provider).unwrap();
            assert!(max_abs_diff(single, frame) < 1e-15);
        }
    }

    #[test]
    fn from_baseline_requires_matching_grid() {
        let mut source = engine(8, 1);
        let baseline = source.build_default_baseline().unwrap().clone();
        let config = RealisationConfig::new(8, 1000.0).with_samples_per_decade(20);
        let seeded = FieldRealisation::from_baseline(config.clone(), baseline.clone()).unwrap();
        assert_eq!(seeded.baseline(), Some(&baseline));

        let wrong = RealisationConfig::new(16, 1000.0);
        assert!(FieldRealisation::from_baseline(wrong, baseline.clone()).is_err());
        let spectrum = baseline.forward().unwrap();
        assert!(matches!(
            FieldRealisation::from_baseline(config, spectrum),
            Err(CosmosError::WrongDomain { .. })
        ));
    }

    #[test]
    fn engine_estimate_uses_the_current_field() {
        let estimator = SpectrumEstimator::new().with_bins(4);
        let mut fresh = engine(16, 12);
        let drawn = fresh.estimate_spectrum(&estimator).unwrap();
        assert!(fresh.baseline().is_some());
        let standalone = estimator.estimate(fresh.physical_field().unwrap()).unwrap();
        assert_eq!(drawn, standalone);

        let samples = fresh.sample_wavenumbers().unwrap().len();
        fresh.evolve_with_transfer(&vec![0.5; samples]).unwrap();
        let evolved = fresh.estimate_spectrum(&estimator).unwrap();
        assert_relative_eq!(
            evolved.bins.bins()[0].power,
            0.25 * drawn.bins.bins()[0].power,
            max_relative = 1e-9
        );
    }

    #[test]
    fn symmetry_rejects_wrong_shape() {
        let mut bad = Array2::<Complex64>::zeros((8, 8));
        assert!(enforce_real_symmetry(&mut bad).is_err());
    }

    #[test]
    fn engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FieldRealisation>();
    }
}
