//! Tests for the quantization engine lifecycle.

use super::engine::*;
use super::model::{Activation, EmbeddingModel};
use crate::config::QuantizationConfig;
use crate::distance::cosine_similarity;
use crate::error::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn samples(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn model() -> EmbeddingModel {
    EmbeddingModel::random(&[32, 48, 16], Activation::Relu, 7).unwrap()
}

fn engine_with(config: QuantizationConfig) -> QuantizationEngine {
    let engine = QuantizationEngine::new(config.clone()).unwrap();
    engine.initialize(config, model()).unwrap();
    engine
}

#[test]
fn test_uninitialized_engine_refuses_inference() {
    let engine = QuantizationEngine::new(QuantizationConfig::default()).unwrap();
    assert!(matches!(engine.infer(&[0.0; 32]), Err(Error::UninitializedModel)));
    assert!(matches!(engine.embed("hello"), Err(Error::UninitializedModel)));
    assert!(!engine.status().initialized);
    assert!(engine.force_fallback(FallbackReason::ManualOverride).is_err());
}

#[test]
fn test_invalid_config_rejected() {
    let config = QuantizationConfig {
        fallback_threshold: 0.99,
        warning_threshold: 0.9,
        ..QuantizationConfig::default()
    };
    assert!(matches!(
        QuantizationEngine::new(config),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_initialized_engine_serves_fp32() {
    let engine = engine_with(QuantizationConfig::default());
    let out = engine.infer(&[0.1; 32]).unwrap();
    assert_eq!(out, model().forward(&[0.1; 32]).unwrap());
    let status = engine.status();
    assert_eq!(status.mode, ModelMode::Fp32);
    assert!(status.initialized);
    assert!(!status.fallback);
    assert_eq!(status.fp32_inferences, 1);
}

#[test]
fn test_accepted_quantization_activates_int8() {
    let engine = engine_with(QuantizationConfig::default());
    let result = engine.quantize(&model(), &samples(120, 32, 1));

    assert!(result.success, "{:?}", result.failure);
    assert!(result.activated);
    assert!(result.failure.is_none());
    assert!(result.measured_similarity >= 0.98);
    assert!(result.compression_ratio > 3.0);

    let status = engine.status();
    assert_eq!(status.mode, ModelMode::Int8);
    assert_eq!(status.last_similarity, Some(result.measured_similarity));

    let input = samples(1, 32, 99).remove(0);
    let int8 = engine.infer_detailed(&input).unwrap();
    let fp32 = model().forward(&input).unwrap();
    assert!(cosine_similarity(&int8.vector, &fp32) > 0.95);
    assert_eq!(engine.status().int8_inferences, 1);
}

#[test]
fn test_insufficient_calibration_stays_fp32() {
    let engine = QuantizationEngine::new(QuantizationConfig::default()).unwrap();
    let result = engine.quantize(&model(), &samples(10, 32, 1));
    assert!(!result.success);
    assert_eq!(
        result.failure,
        Some(QuantizationFailure::InsufficientCalibrationData {
            provided: 10,
            required: 100
        })
    );
    // The model is still usable in fp32.
    assert_eq!(engine.status().mode, ModelMode::Fp32);
    assert!(engine.infer(&[0.0; 32]).is_ok());
}

#[test]
fn test_malformed_calibration_sample_reported() {
    let engine = engine_with(QuantizationConfig::default());
    let mut calibration = samples(120, 32, 1);
    calibration[5].pop();
    let result = engine.quantize(&model(), &calibration);
    assert!(matches!(
        result.failure,
        Some(QuantizationFailure::InvalidInput(_))
    ));
}

#[test]
fn test_rejected_quantization_latches_fallback() {
    let engine = engine_with(QuantizationConfig::fp32_only());
    let result = engine.quantize(&model(), &samples(120, 32, 1));
    assert!(!result.success);
    assert!(!result.activated);
    assert!(matches!(
        result.failure,
        Some(QuantizationFailure::AccuracyBelowThreshold { threshold, .. }) if (threshold - 1.0).abs() < f32::EPSILON
    ));
    assert!(result.artifact().is_none());

    let status = engine.status();
    assert_eq!(status.mode, ModelMode::Fp32);
    assert_eq!(status.fallback_reason, Some(FallbackReason::SimilarityTooLow));
    assert_eq!(status.fallback_count, 1);
}

#[test]
fn test_warning_band_accepts_with_warning() {
    let config = QuantizationConfig {
        warning_threshold: 1.0,
        fallback_threshold: 0.5,
        ..QuantizationConfig::default()
    };
    let engine = engine_with(config);
    let result = engine.quantize(&model(), &samples(120, 32, 1));
    assert!(result.success);
    assert!(result.activated);
    assert!(result.warning.is_some());
    assert_eq!(engine.status().mode, ModelMode::Int8);
}

#[test]
fn test_forced_fallback_blocks_activation_until_initialize() {
    let engine = engine_with(QuantizationConfig::default());
    engine.force_fallback(FallbackReason::ManualOverride).unwrap();

    let result = engine.quantize(&model(), &samples(120, 32, 1));
    assert!(result.success);
    assert!(!result.activated);
    let status = engine.status();
    assert_eq!(status.mode, ModelMode::Fp32);
    assert_eq!(status.fallback_reason, Some(FallbackReason::ManualOverride));

    engine
        .initialize(QuantizationConfig::default(), model())
        .unwrap();
    assert!(!engine.status().fallback);
    let result = engine.quantize(&model(), &samples(120, 32, 1));
    assert!(result.activated);
    assert_eq!(engine.status().mode, ModelMode::Int8);
}

#[test]
fn test_artifact_round_trip_and_activate() {
    let producer = engine_with(QuantizationConfig::default());
    let result = producer.quantize(&model(), &samples(120, 32, 1));
    let bytes = result.artifact().unwrap().to_bytes().unwrap();
    assert_eq!(producer.artifact().unwrap().to_bytes().unwrap(), bytes);

    let consumer = engine_with(QuantizationConfig::default());
    let artifact = QuantizationArtifact::from_bytes(&bytes).unwrap();
    let restored = consumer.activate(artifact).unwrap();
    assert!(restored.activated);
    assert_eq!(consumer.status().mode, ModelMode::Int8);

    let input = samples(1, 32, 5).remove(0);
    assert_eq!(
        producer.infer(&input).unwrap(),
        consumer.infer(&input).unwrap()
    );
}

#[test]
fn test_latched_fallback_withholds_artifact() {
    let engine = engine_with(QuantizationConfig::default());
    assert!(engine.quantize(&model(), &samples(120, 32, 1)).activated);
    assert!(engine.artifact().is_some());

    engine.force_fallback(FallbackReason::ManualOverride).unwrap();
    assert!(engine.artifact().is_none());

    engine
        .initialize(QuantizationConfig::default(), model())
        .unwrap();
    assert!(engine.quantize(&model(), &samples(120, 32, 1)).activated);
    assert!(engine.artifact().is_some());
}

#[test]
fn test_activate_requires_reference_model() {
    let producer = engine_with(QuantizationConfig::default());
    let artifact = producer
        .quantize(&model(), &samples(120, 32, 1))
        .artifact()
        .unwrap();
    let empty = QuantizationEngine::new(QuantizationConfig::default()).unwrap();
    assert!(matches!(
        empty.activate(artifact),
        Err(Error::UninitializedModel)
    ));
}

#[test]
fn test_shadow_sampling_rate() {
    let config = QuantizationConfig {
        shadow_sample_rate: 0.5,
        ..QuantizationConfig::default()
    };
    let engine = engine_with(config);
    assert!(engine.quantize(&model(), &samples(120, 32, 1)).activated);
    for input in samples(4, 32, 8) {
        engine.infer(&input).unwrap();
    }
    let status = engine.status();
    assert_eq!(status.mode, ModelMode::Int8);
    assert_eq!(status.shadow_checks, 2);
    assert_eq!(status.int8_inferences, 4);
}

#[test]
fn test_embed_text_uses_model_width() {
    let engine = engine_with(QuantizationConfig::default());
    let embedding = engine.embed("replace the battery").unwrap();
    assert_eq!(embedding.vector.len(), 16);
    assert_eq!(embedding.mode, ModelMode::Fp32);
    assert_eq!(engine.features("replace the battery").unwrap().len(), 32);
}

#[test]
fn test_failure_converts_to_error() {
    let err: Error = QuantizationFailure::MemoryBudgetExceeded {
        required_bytes: 10,
        budget_bytes: 5,
    }
    .into();
    assert!(matches!(err, Error::MemoryBudgetExceeded { .. }));
}
