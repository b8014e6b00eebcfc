// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_relative_eq;
use st_cosmos::{
    telemetry, CosmosError, FieldRealisation, KSpaceGrid, PowerSpectrumParams, RealisationConfig,
    ScaleInvariantSpectrum, SpectralField, SpectrumEstimator,
};

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values[values.len() / 2]
}

fn realise(n: usize, scale: f64, seed: u64) -> SpectralField {
    let mut engine = FieldRealisation::new(RealisationConfig::new(n, scale).with_seed(seed))
        .expect("engine");
    engine.build_default_baseline().expect("baseline").clone()
}

#[test]
fn fixed_seed_small_map_recovers_tilt() {
    telemetry::init_tracing();
    let mut engine =
        FieldRealisation::new(RealisationConfig::new(64, 1000.0).with_seed(2)).expect("engine");
    let estimate = engine
        .estimate_spectrum(&SpectrumEstimator::new().with_bins(8))
        .expect("estimate");
    assert_eq!(engine.physical_field().expect("field").shape(), (64, 64));
    assert_eq!(estimate.bins.len(), 8);
    assert!((estimate.tilt() - 0.96).abs() < 0.1, "tilt {}", estimate.tilt());
    assert!(estimate.fit.tilt_error.is_finite());
}

#[test]
fn small_map_recovers_tilt_across_seeds() {
    telemetry::init_tracing();
    let estimator = SpectrumEstimator::new().with_bins(8);
    let mut tilts = Vec::new();
    for seed in 0..5 {
        let field = realise(64, 1000.0, seed);
        assert_eq!(field.shape(), (64, 64));
        let values = field.as_physical().expect("physical");
        let rms = (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt();
        assert!(field.mean().expect("mean").abs() < 1e-10 * rms);

        let estimate = estimator.estimate(&field).expect("estimate");
        assert_eq!(estimate.bins.len(), 8);
        assert!(!estimate.raw);
        tilts.push(estimate.tilt());
    }
    let tilt = median(tilts);
    assert!((tilt - 0.96).abs() < 0.1, "median tilt {tilt}");
}

#[test]
fn larger_map_recovers_amplitude_and_tilt() {
    telemetry::init_tracing();
    let estimator = SpectrumEstimator::new();
    let mut tilts = Vec::new();
    let mut amplitudes = Vec::new();
    for seed in 10..15 {
        let estimate = estimator.estimate(&realise(128, 1000.0, seed)).expect("estimate");
        assert!(estimate.fit.tilt_error.is_finite() && estimate.fit.tilt_error > 0.0);
        assert!(estimate.fit.amplitude_error.is_finite());
        tilts.push(estimate.tilt());
        amplitudes.push(estimate.amplitude());
    }
    let tilt = median(tilts);
    let amplitude = median(amplitudes);
    assert!((tilt - 0.96).abs() < 0.05, "median tilt {tilt}");
    assert_relative_eq!(amplitude, 2.1e-9, max_relative = 0.1);
}

#[test]
fn realised_power_matches_the_model_on_average() {
    let n = 32;
    let scale = 1000.0;
    let grid = KSpaceGrid::new(n, scale).expect("grid");
    let model = ScaleInvariantSpectrum::new(PowerSpectrumParams::default()).expect("model");
    let expected = SpectralField::frequency(
        model.power_grid(&grid).mapv(|p| num_complex::Complex64::new(p.sqrt(), 0.0)),
        n,
        scale,
    )
    .expect("model field")
    .total_power();

    let mut engine =
        FieldRealisation::new(RealisationConfig::new(n, scale).with_seed(2024)).expect("engine");
    let draws = 32;
    let mut total = 0.0;
    for _ in 0..draws {
        let physical = engine.build_default_baseline().expect("baseline").clone();
        let spectral = engine.frequency_field().expect("spectrum").total_power();
        assert_relative_eq!(physical.total_power(), spectral, max_relative = 1e-9);
        total += spectral;
    }
    let ratio = total / draws as f64 / expected;
    assert!((0.85..=1.15).contains(&ratio), "power ratio {ratio}");
}

#[test]
fn round_trip_preserves_a_realisation() {
    let field = realise(48, 750.0, 3);
    let back = field.forward().expect("forward").inverse().expect("inverse");
    let original = field.as_physical().expect("physical");
    let restored = back.as_physical().expect("physical");
    let peak = original.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    for (a, b) in original.iter().zip(restored.iter()) {
        assert!((a - b).abs() <= 1e-10 * peak);
    }
}

#[test]
fn unit_grid_magnitudes() {
    let grid = KSpaceGrid::new(4, 2.0 * std::f64::consts::PI).expect("grid");
    assert_eq!(grid.magnitudes().dim(), (4, 3));
    assert_relative_eq!(grid.magnitudes()[[2, 0]], 2.0, epsilon = 1e-12);
    assert_relative_eq!(grid.magnitudes()[[1, 1]], 2f64.sqrt(), epsilon = 1e-12);
    assert_eq!(grid.magnitudes()[[0, 0]], 0.0);
}

#[test]
fn more_bins_than_modes_is_degenerate() {
    let field = realise(4, 100.0, 1);
    // 4 × 3 half spectrum minus the mean leaves 11 modes
    let err = SpectrumEstimator::new()
        .with_bins(12)
        .estimate(&field)
        .expect_err("too many bins");
    assert!(matches!(err, CosmosError::DegenerateEstimation { .. }));
    assert!(err.is_degenerate());
}

#[test]
fn config_file_drives_the_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("realisation.toml");
    std::fs::write(
        &path,
        "n = 16\nscale = 400.0\nseed = 77\nsamples_per_decade = 8\n\n[spectrum]\ntilt = 0.9\n",
    )
    .expect("write config");
    let config = RealisationConfig::load(&path).expect("config");
    let mut a = FieldRealisation::new(config.clone()).expect("engine");
    let mut b = FieldRealisation::new(config).expect("engine");
    let first = a.build_default_baseline().expect("baseline").clone();
    assert_eq!(first.shape(), (16, 16));
    assert_eq!(&first, b.build_default_baseline().expect("baseline"));
    assert_eq!(a.sample_wavenumbers().expect("ks").len(), 8 * 2 + 1);
}
