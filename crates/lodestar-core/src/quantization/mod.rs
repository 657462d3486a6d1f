//! Int8 quantization of embedding models with fp32 fallback.
//!
//! | Path | Weights | Activations | Size |
//! |------|---------|-------------|------|
//! | fp32 | f32 | f32 | 1x |
//! | int8 | i8, symmetric, per channel or per tensor | u8, asymmetric, calibrated | ~4x smaller |
//!
//! [`QuantizationEngine::quantize`] calibrates activation ranges on the
//! calibration set, quantizes weights (optionally block by block), validates
//! the int8 model against fp32 on held-out samples and applies the
//! [`AccuracyPolicy`]. Inference then runs on whichever model the engine
//! state selects.

mod calibration;
mod engine;
mod features;
mod model;
mod policy;
mod tensor;
mod tiling;

#[cfg(test)]
mod calibration_tests;
#[cfg(test)]
mod engine_tests;

pub use calibration::{
    calibrate, AbsHistogram, CalibrationStats, CalibrationStrategy, HISTOGRAM_BINS, KL_TARGET_BINS,
};
pub use engine::{
    Embedding, EngineStatus, FallbackReason, ModelMode, QuantizationArtifact, QuantizationEngine,
    QuantizationFailure, QuantizationResult,
};
pub use features::{FeatureExtractor, HashingFeatureExtractor};
pub use model::{Activation, DenseLayer, EmbeddingModel, QuantizedLayer, QuantizedModel};
pub use policy::{measure_similarity, output_similarity, validation_split, AccuracyPolicy, Verdict};
pub use tensor::{
    quantize_symmetric, symmetric_scale, ActivationParams, Granularity, QuantizedTensor,
};
pub use tiling::{check_memory_budget, estimate_working_set, rows_per_block, TiledQuantizer};
