//! Tests for activation calibration.
#![allow(clippy::cast_precision_loss)]

use super::calibration::*;

#[test]
fn test_stats_welford() {
    let stats = CalibrationStats::from_samples([&[1.0_f32, 2.0][..], &[3.0, 4.0][..]]);
    assert_eq!(stats.count, 4);
    assert!((stats.mean - 2.5).abs() < 1e-9);
    assert!((stats.std() - 1.25_f64.sqrt()).abs() < 1e-9);
    assert!((stats.min - 1.0).abs() < f32::EPSILON);
    assert!((stats.absmax() - 4.0).abs() < f32::EPSILON);
    assert!(stats.is_sufficient(4));
    assert!(!stats.is_sufficient(5));
}

#[test]
fn test_min_max_uses_observed_range() {
    let a = [-1.0_f32, 0.5, 3.0];
    let params = calibrate(&[&a[..]], CalibrationStrategy::MinMax, 0.999);
    assert!((params.scale - 4.0 / 255.0).abs() < 1e-6);
    assert_eq!(params.zero_point, 64);
}

#[test]
fn test_percentile_clips_outlier() {
    let mut values: Vec<f32> = (0..1000).map(|i| (i % 100) as f32 / 100.0).collect();
    values.push(500.0);
    let clipped = calibrate(&[&values[..]], CalibrationStrategy::Percentile, 0.99);
    let full = calibrate(&[&values[..]], CalibrationStrategy::MinMax, 0.99);
    assert!(clipped.scale < full.scale / 50.0);
}

#[test]
fn test_kl_clips_long_tail() {
    // Exponentially decaying mass near zero with a handful of distant outliers.
    let mut values: Vec<f32> = (0..20_000)
        .map(|i| {
            let u = (i as f32 + 0.5) / 20_000.0;
            let magnitude = -u.ln() * 0.2;
            if i % 2 == 0 {
                magnitude
            } else {
                -magnitude
            }
        })
        .collect();
    values.extend([80.0, -90.0, 100.0]);
    let kl = calibrate(&[&values[..]], CalibrationStrategy::Kl, 0.999);
    let full = calibrate(&[&values[..]], CalibrationStrategy::MinMax, 0.999);
    assert!(kl.scale < full.scale / 5.0);
}

#[test]
fn test_histogram_percentile_and_total() {
    let mut h = AbsHistogram::new(10.0, 10);
    h.add(&[0.5, -1.5, 2.5, 9.9, 25.0]);
    assert_eq!(h.total(), 5);
    assert_eq!(h.bins()[9], 2);
    assert!((h.percentile_threshold(0.6) - 3.0).abs() < 1e-5);
}

#[test]
fn test_empty_histogram_threshold_is_zero() {
    let h = AbsHistogram::new(0.0, HISTOGRAM_BINS);
    assert!(h.kl_threshold(KL_TARGET_BINS).abs() < f32::EPSILON);
    assert!(h.percentile_threshold(0.5).abs() < f32::EPSILON);
}

#[test]
fn test_strategy_parsing() {
    assert_eq!("minmax".parse::<CalibrationStrategy>().unwrap(), CalibrationStrategy::MinMax);
    assert_eq!("KL".parse::<CalibrationStrategy>().unwrap(), CalibrationStrategy::Kl);
    assert!("entropy".parse::<CalibrationStrategy>().is_err());
    assert_eq!(CalibrationStrategy::Percentile.to_string(), "percentile");
}
