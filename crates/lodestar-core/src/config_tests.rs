use super::config::*;
use crate::distance::DistanceMetric;
use crate::error::Error;
use crate::quantization::{CalibrationStrategy, Granularity};
use figment::Jail;

#[test]
fn test_defaults_are_valid() {
    let config = LodestarConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.index.m, 16);
    assert_eq!(config.index.ef_construction, 200);
    assert_eq!(config.index.distance_metric, DistanceMetric::Cosine);
    assert_eq!(config.quantization.granularity, Granularity::PerChannel);
    assert!((config.quantization.fallback_threshold - 0.95).abs() < f32::EPSILON);
    assert!((config.quantization.warning_threshold - 0.98).abs() < f32::EPSILON);
    assert_eq!(config.quantization.max_memory_mb, 50);
    assert!(!config.quantization.tiling.enabled);
    assert_eq!(config.query.max_top_k, 20);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_from_toml_str_overrides_sections() {
    let config = LodestarConfig::from_toml_str(
        r#"
        [index]
        m = 8
        ef_construction = 64
        distance_metric = "euclidean"

        [quantization]
        granularity = "per_tensor"
        calibration_strategy = "minmax"
        fallback_threshold = 0.9

        [quantization.tiling]
        enabled = true
        block_size = 4096
        "#,
    )
    .unwrap();
    assert_eq!(config.index.m, 8);
    assert_eq!(config.index.distance_metric, DistanceMetric::L2);
    assert_eq!(config.index.ef_search, 64);
    assert_eq!(config.quantization.granularity, Granularity::PerTensor);
    assert_eq!(config.quantization.calibration_strategy, CalibrationStrategy::MinMax);
    assert!((config.quantization.fallback_threshold - 0.9).abs() < f32::EPSILON);
    assert!(config.quantization.tiling.enabled);
    assert_eq!(config.quantization.tiling.block_size, 4096);
    assert_eq!(config.quantization.tiling.max_concurrent_blocks, 4);
}

#[test]
fn test_threshold_order_enforced() {
    let err = LodestarConfig::from_toml_str(
        "[quantization]\nfallback_threshold = 0.99\nwarning_threshold = 0.9\n",
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("fallback_threshold")));
}

#[test]
fn test_equal_thresholds_allowed() {
    let config = QuantizationConfig {
        warning_threshold: 0.97,
        fallback_threshold: 0.97,
        ..QuantizationConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_out_of_range_values_rejected() {
    let cases = [
        "[index]\nm = 1\n",
        "[index]\nm = 32\nef_construction = 16\n",
        "[quantization]\nmax_memory_mb = 0\n",
        "[quantization]\nvalidation_fraction = 1.0\n",
        "[quantization]\nshadow_sample_rate = 1.5\n",
        "[quantization]\nmin_calibration_samples = 1\n",
        "[quantization.tiling]\nmax_concurrent_blocks = 0\n",
        "[query]\nmax_top_k = 101\n",
        "[query]\ndefault_timeout_ms = 0\n",
    ];
    for case in cases {
        assert!(
            LodestarConfig::from_toml_str(case).is_err(),
            "accepted invalid config:\n{case}"
        );
    }
}

#[test]
fn test_unknown_enum_value_is_config_error() {
    let err = LodestarConfig::from_toml_str("[index]\ndistance_metric = \"hamming\"\n").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_presets_are_valid() {
    for preset in [
        QuantizationConfig::high_precision(),
        QuantizationConfig::high_performance(),
        QuantizationConfig::fp32_only(),
    ] {
        assert!(preset.validate().is_ok(), "{preset:?}");
    }
    assert_eq!(
        QuantizationConfig::high_precision().calibration_strategy,
        CalibrationStrategy::Kl
    );
    assert_eq!(QuantizationConfig::high_performance().max_latency_ms, Some(5));
}

#[test]
fn test_toml_round_trip() {
    let mut config = LodestarConfig::default();
    config.query.default_top_k = 7;
    config.quantization.max_latency_ms = Some(12);
    let rendered = config.to_toml().unwrap();
    assert_eq!(LodestarConfig::from_toml_str(&rendered).unwrap(), config);
}

#[test]
fn test_load_merges_file_and_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            CONFIG_FILE,
            r#"
            [index]
            m = 12
            [query]
            default_top_k = 3
            "#,
        )?;
        jail.set_env("LODESTAR_QUERY__DEFAULT_TOP_K", "9");
        jail.set_env("LODESTAR_QUANTIZATION__FALLBACK_THRESHOLD", "0.9");

        let config = LodestarConfig::load().expect("config loads");
        assert_eq!(config.index.m, 12);
        assert_eq!(config.query.default_top_k, 9);
        assert!((config.quantization.fallback_threshold - 0.9).abs() < f32::EPSILON);
        Ok(())
    });
}

#[test]
fn test_load_without_file_uses_defaults() {
    Jail::expect_with(|_jail| {
        let config = LodestarConfig::load().expect("config loads");
        assert_eq!(config, LodestarConfig::default());
        Ok(())
    });
}

#[test]
fn test_from_file_missing_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = LodestarConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_from_file_reads_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
    let config = LodestarConfig::from_file(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
}
