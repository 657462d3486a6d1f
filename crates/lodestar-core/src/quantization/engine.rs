//! The quantization engine: model lifecycle, inference and fallback.
//!
//! The engine's runtime state is an immutable [`RuntimeState`] snapshot held
//! in an [`ArcSwap`]. Inference loads the current snapshot without locking;
//! transitions publish a whole new snapshot. Once a fallback has been
//! latched, int8 stays inactive until the next [`QuantizationEngine::initialize`].

use super::features::{FeatureExtractor, HashingFeatureExtractor};
use super::model::{EmbeddingModel, QuantizedModel};
use super::policy::{measure_similarity, output_similarity, validation_split, AccuracyPolicy, Verdict};
use super::tiling::check_memory_budget;
use crate::config::QuantizationConfig;
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which model answers inference requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    /// The quantized model.
    Int8,
    /// The fp32 reference model.
    Fp32,
}

impl fmt::Display for ModelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int8 => "int8",
            Self::Fp32 => "fp32",
        })
    }
}

/// Why the engine runs on fp32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Validation similarity below the fallback threshold.
    SimilarityTooLow,
    /// A shadow check diverged from fp32 at runtime.
    AccuracyDrop,
    /// A shadow-checked int8 inference exceeded `max_latency_ms`.
    InferenceSlow,
    /// Quantization would exceed the memory budget.
    MemoryPressure,
    /// Requested through [`QuantizationEngine::force_fallback`].
    ManualOverride,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SimilarityTooLow => "similarity_too_low",
            Self::AccuracyDrop => "accuracy_drop",
            Self::InferenceSlow => "inference_slow",
            Self::MemoryPressure => "memory_pressure",
            Self::ManualOverride => "manual_override",
        })
    }
}

/// A failed quantization attempt, reported inside [`QuantizationResult`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuantizationFailure {
    /// Fewer calibration samples than `min_calibration_samples`.
    #[error("insufficient calibration data: got {provided} samples, need at least {required}")]
    InsufficientCalibrationData {
        /// Samples supplied.
        provided: usize,
        /// Configured minimum.
        required: usize,
    },
    /// Working set over `max_memory_mb`.
    #[error("memory budget exceeded: need {required_bytes} bytes, budget is {budget_bytes} bytes")]
    MemoryBudgetExceeded {
        /// Estimated working set.
        required_bytes: u64,
        /// Configured budget.
        budget_bytes: u64,
    },
    /// Held-out similarity below `fallback_threshold`.
    #[error("accuracy below threshold: similarity {similarity:.4} < {threshold:.4}")]
    AccuracyBelowThreshold {
        /// Measured similarity.
        similarity: f32,
        /// Threshold in force.
        threshold: f32,
    },
    /// Calibration data or model could not be processed.
    #[error("invalid quantization input: {0}")]
    InvalidInput(String),
}

impl From<QuantizationFailure> for Error {
    fn from(failure: QuantizationFailure) -> Self {
        match failure {
            QuantizationFailure::InsufficientCalibrationData { provided, required } => {
                Self::InsufficientCalibrationData { provided, required }
            }
            QuantizationFailure::MemoryBudgetExceeded {
                required_bytes,
                budget_bytes,
            } => Self::MemoryBudgetExceeded {
                required_bytes,
                budget_bytes,
            },
            QuantizationFailure::AccuracyBelowThreshold {
                similarity,
                threshold,
            } => Self::AccuracyBelowThreshold {
                similarity,
                threshold,
            },
            QuantizationFailure::InvalidInput(msg) => Self::InvalidModel(msg),
        }
    }
}

impl QuantizationFailure {
    fn from_error(err: Error) -> Self {
        match err {
            Error::MemoryBudgetExceeded {
                required_bytes,
                budget_bytes,
            } => Self::MemoryBudgetExceeded {
                required_bytes,
                budget_bytes,
            },
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Outcome of [`QuantizationEngine::quantize`] or [`QuantizationEngine::activate`].
#[derive(Debug, Clone)]
pub struct QuantizationResult {
    /// The quantized model, when one was produced.
    pub quantized_model: Option<Arc<QuantizedModel>>,
    /// fp32 size over int8 size (0.0 without a model).
    pub compression_ratio: f32,
    /// Mean held-out cosine similarity (0.0 if never measured).
    pub measured_similarity: f32,
    /// True if the policy accepted the int8 model.
    pub success: bool,
    /// Set when accepted inside the warning band.
    pub warning: Option<String>,
    /// True if int8 now serves inference.
    pub activated: bool,
    /// Why quantization failed, if it did.
    pub failure: Option<QuantizationFailure>,
    /// Wall time spent.
    pub duration: Duration,
}

impl QuantizationResult {
    fn failed(failure: QuantizationFailure, started: Instant) -> Self {
        Self {
            quantized_model: None,
            compression_ratio: 0.0,
            measured_similarity: 0.0,
            success: false,
            warning: None,
            activated: false,
            failure: Some(failure),
            duration: started.elapsed(),
        }
    }

    /// Persistable artifact of an accepted model.
    #[must_use]
    pub fn artifact(&self) -> Option<QuantizationArtifact> {
        if !self.success {
            return None;
        }
        self.quantized_model.as_ref().map(|model| QuantizationArtifact {
            model: QuantizedModel::clone(model),
            measured_similarity: self.measured_similarity,
        })
    }
}

/// A quantized model together with the similarity it was validated at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationArtifact {
    /// The quantized model.
    pub model: QuantizedModel,
    /// Similarity measured when it was produced.
    pub measured_similarity: f32,
}

impl QuantizationArtifact {
    /// Serializes the artifact with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes an artifact, validating the model shapes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifact: Self = bincode::deserialize(bytes)?;
        artifact.model.validate()?;
        Ok(artifact)
    }
}

/// An embedding and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// Model that produced it.
    pub mode: ModelMode,
    /// Set when fp32 served because of a fallback.
    pub fallback: Option<FallbackReason>,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Active model.
    pub mode: ModelMode,
    /// True once a model has been installed.
    pub initialized: bool,
    /// Similarity of the last validation.
    pub last_similarity: Option<f32>,
    /// True while a fallback is latched.
    pub fallback: bool,
    /// Reason of the latched fallback.
    pub fallback_reason: Option<FallbackReason>,
    /// Size ratio of the installed int8 model.
    pub compression_ratio: Option<f32>,
    /// Inferences served by int8.
    pub int8_inferences: u64,
    /// Inferences served by fp32.
    pub fp32_inferences: u64,
    /// Int8 inferences shadowed by fp32.
    pub shadow_checks: u64,
    /// Transitions to fp32.
    pub fallback_count: u64,
    /// Mean int8 forward latency.
    pub avg_int8_latency: Duration,
    /// Mean fp32 forward latency.
    pub avg_fp32_latency: Duration,
}

/// Immutable snapshot of what the engine serves.
#[derive(Debug, Clone)]
struct RuntimeState {
    config: Arc<QuantizationConfig>,
    fp32: Option<Arc<EmbeddingModel>>,
    int8: Option<Arc<QuantizedModel>>,
    mode: ModelMode,
    last_similarity: Option<f32>,
    fallback: Option<FallbackReason>,
}

impl RuntimeState {
    fn empty(config: QuantizationConfig) -> Self {
        Self {
            config: Arc::new(config),
            fp32: None,
            int8: None,
            mode: ModelMode::Fp32,
            last_similarity: None,
            fallback: None,
        }
    }

    fn input_dim(&self) -> Option<usize> {
        match (self.mode, &self.int8, &self.fp32) {
            (ModelMode::Int8, Some(int8), _) => Some(int8.input_dim()),
            (_, _, Some(fp32)) => Some(fp32.input_dim()),
            (_, Some(int8), None) => Some(int8.input_dim()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    int8_inferences: AtomicU64,
    fp32_inferences: AtomicU64,
    int8_nanos: AtomicU64,
    fp32_nanos: AtomicU64,
    shadow_checks: AtomicU64,
    shadow_tick: AtomicU64,
    fallback_count: AtomicU64,
}

impl EngineCounters {
    fn record(&self, mode: ModelMode, elapsed: Duration) {
        // SAFETY: a single inference never takes 584 years.
        #[allow(clippy::cast_possible_truncation)]
        let nanos = elapsed.as_nanos() as u64;
        let (count, total) = match mode {
            ModelMode::Int8 => (&self.int8_inferences, &self.int8_nanos),
            ModelMode::Fp32 => (&self.fp32_inferences, &self.fp32_nanos),
        };
        count.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(nanos, Ordering::Relaxed);
    }

    fn average(count: &AtomicU64, total: &AtomicU64) -> Duration {
        let n = count.load(Ordering::Relaxed);
        if n == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(total.load(Ordering::Relaxed) / n)
    }
}

/// Int8 quantization engine with fp32 fallback.
///
/// # Example
///
/// ```rust
/// use lodestar_core::config::QuantizationConfig;
/// use lodestar_core::quantization::{EmbeddingModel, ModelMode, QuantizationEngine};
///
/// let engine = QuantizationEngine::new(QuantizationConfig::default())?;
/// let model = EmbeddingModel::random_projection(32, 8, 7)?;
/// engine.initialize(QuantizationConfig::default(), model)?;
/// assert_eq!(engine.status().mode, ModelMode::Fp32);
/// assert_eq!(engine.infer(&[0.5; 32])?.len(), 8);
/// # Ok::<(), lodestar_core::Error>(())
/// ```
pub struct QuantizationEngine {
    state: ArcSwap<RuntimeState>,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    counters: EngineCounters,
}

impl fmt::Debug for QuantizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationEngine")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl QuantizationEngine {
    /// Creates an engine with no model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: QuantizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: ArcSwap::from_pointee(RuntimeState::empty(config)),
            extractor: None,
            counters: EngineCounters::default(),
        })
    }

    /// Uses `extractor` for [`QuantizationEngine::embed`] instead of feature
    /// hashing sized to the model input.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Installs `model` as the fp32 reference and serves it.
    ///
    /// Replaces the configuration, drops any int8 model and clears a latched
    /// fallback.
    pub fn initialize(&self, config: QuantizationConfig, model: EmbeddingModel) -> Result<()> {
        config.validate()?;
        tracing::info!(
            input_dim = model.input_dim(),
            output_dim = model.output_dim(),
            params = model.param_count(),
            "quantization engine initialized"
        );
        self.state.store(Arc::new(RuntimeState {
            fp32: Some(Arc::new(model)),
            ..RuntimeState::empty(config)
        }));
        Ok(())
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> Arc<QuantizationConfig> {
        Arc::clone(&self.state.load().config)
    }

    /// Quantizes `model` and validates it on held-out calibration samples.
    ///
    /// `model` becomes the engine's fp32 reference. An accepted int8 model is
    /// activated unless a fallback is latched; a rejected one latches
    /// [`FallbackReason::SimilarityTooLow`] and a model over the memory budget
    /// latches [`FallbackReason::MemoryPressure`]. Failures are reported in
    /// the result, never as `Err`.
    pub fn quantize(&self, model: &EmbeddingModel, calibration: &[Vec<f32>]) -> QuantizationResult {
        let started = Instant::now();
        let config = self.config();
        let reference = Arc::new(model.clone());
        self.install_reference(&reference);

        if calibration.len() < config.min_calibration_samples {
            tracing::warn!(
                provided = calibration.len(),
                required = config.min_calibration_samples,
                "not enough calibration data, staying on fp32"
            );
            return QuantizationResult::failed(
                QuantizationFailure::InsufficientCalibrationData {
                    provided: calibration.len(),
                    required: config.min_calibration_samples,
                },
                started,
            );
        }
        if let Some(bad) = calibration
            .iter()
            .position(|s| s.len() != model.input_dim() || s.iter().any(|v| !v.is_finite()))
        {
            return QuantizationResult::failed(
                QuantizationFailure::InvalidInput(format!(
                    "calibration sample {bad} is not a finite {}-wide vector",
                    model.input_dim()
                )),
                started,
            );
        }
        if let Err(err) = check_memory_budget(model, &config) {
            tracing::warn!(error = %err, "quantization skipped, staying on fp32");
            self.latch(&reference, None, FallbackReason::MemoryPressure);
            return QuantizationResult::failed(QuantizationFailure::from_error(err), started);
        }

        let held_out = validation_split(calibration.len(), config.validation_fraction);
        let (fit, validation) = calibration.split_at(calibration.len() - held_out);
        let quantized = match QuantizedModel::quantize(model, fit, &config) {
            Ok(q) => Arc::new(q),
            Err(err) => {
                return QuantizationResult::failed(QuantizationFailure::from_error(err), started)
            }
        };
        let similarity = match measure_similarity(model, &quantized, validation) {
            Ok(s) => s,
            Err(err) => {
                return QuantizationResult::failed(QuantizationFailure::from_error(err), started)
            }
        };

        let mut result = self.apply_policy(&reference, Arc::clone(&quantized), similarity, &config);
        result.duration = started.elapsed();
        tracing::info!(
            similarity,
            compression_ratio = result.compression_ratio,
            activated = result.activated,
            duration_ms = result.duration.as_millis(),
            "quantization finished"
        );
        result
    }

    /// Re-applies the accuracy policy to a previously produced artifact.
    ///
    /// Requires an fp32 reference to fall back to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UninitializedModel`] without an fp32 model, or
    /// [`Error::DimensionMismatch`] if the artifact does not fit it.
    pub fn activate(&self, artifact: QuantizationArtifact) -> Result<QuantizationResult> {
        let started = Instant::now();
        let state = self.state.load_full();
        let reference = state.fp32.clone().ok_or(Error::UninitializedModel)?;
        for (expected, actual) in [
            (reference.input_dim(), artifact.model.input_dim()),
            (reference.output_dim(), artifact.model.output_dim()),
        ] {
            if expected != actual {
                return Err(Error::DimensionMismatch { expected, actual });
            }
        }
        let mut result = self.apply_policy(
            &reference,
            Arc::new(artifact.model),
            artifact.measured_similarity,
            &state.config,
        );
        result.duration = started.elapsed();
        Ok(result)
    }

    fn install_reference(&self, reference: &Arc<EmbeddingModel>) {
        self.state.rcu(|current| RuntimeState {
            fp32: Some(Arc::clone(reference)),
            int8: None,
            mode: ModelMode::Fp32,
            ..RuntimeState::clone(current)
        });
    }

    fn apply_policy(
        &self,
        reference: &Arc<EmbeddingModel>,
        quantized: Arc<QuantizedModel>,
        similarity: f32,
        config: &QuantizationConfig,
    ) -> QuantizationResult {
        let policy = AccuracyPolicy::from_config(config);
        let verdict = policy.evaluate(similarity);
        let mut result = QuantizationResult {
            compression_ratio: quantized.compression_ratio(),
            quantized_model: Some(Arc::clone(&quantized)),
            measured_similarity: similarity,
            success: verdict.is_accepted(),
            warning: None,
            activated: false,
            failure: None,
            duration: Duration::ZERO,
        };

        if verdict == Verdict::Reject {
            tracing::warn!(
                similarity,
                threshold = policy.fallback_threshold,
                "int8 model rejected, falling back to fp32"
            );
            self.latch(reference, Some(similarity), FallbackReason::SimilarityTooLow);
            result.failure = Some(QuantizationFailure::AccuracyBelowThreshold {
                similarity,
                threshold: policy.fallback_threshold,
            });
            return result;
        }

        if verdict == Verdict::AcceptWithWarning {
            let warning = format!(
                "similarity {similarity:.4} is below the warning threshold {:.4}",
                policy.warning_threshold
            );
            tracing::warn!(similarity, threshold = policy.warning_threshold, "{warning}");
            result.warning = Some(warning);
        }

        let previous = self.state.rcu(|current| {
            let mut next = RuntimeState::clone(current);
            next.fp32 = Some(Arc::clone(reference));
            next.int8 = Some(Arc::clone(&quantized));
            next.last_similarity = Some(similarity);
            next.mode = if current.fallback.is_some() {
                ModelMode::Fp32
            } else {
                ModelMode::Int8
            };
            next
        });
        result.activated = previous.fallback.is_none();
        if !result.activated {
            tracing::info!(
                reason = ?previous.fallback,
                "int8 model accepted but fallback is latched"
            );
        }
        result
    }

    /// Switches to fp32 and latches `reason` if not already latched.
    /// Returns true if this call made the transition.
    fn latch(
        &self,
        reference: &Arc<EmbeddingModel>,
        similarity: Option<f32>,
        reason: FallbackReason,
    ) -> bool {
        let previous = self.state.rcu(|current| {
            let mut next = RuntimeState::clone(current);
            next.fp32 = Some(Arc::clone(reference));
            next.mode = ModelMode::Fp32;
            next.last_similarity = similarity.or(current.last_similarity);
            next.fallback = Some(current.fallback.unwrap_or(reason));
            next
        });
        let transitioned = previous.fallback.is_none();
        if transitioned {
            self.counters.fallback_count.fetch_add(1, Ordering::Relaxed);
        }
        transitioned
    }

    /// Forces fp32 mode until the next [`QuantizationEngine::initialize`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UninitializedModel`] if there is no fp32 model.
    pub fn force_fallback(&self, reason: FallbackReason) -> Result<()> {
        let state = self.state.load_full();
        let reference = state.fp32.clone().ok_or(Error::UninitializedModel)?;
        let previous = self.state.rcu(|current| {
            let mut next = RuntimeState::clone(current);
            next.mode = ModelMode::Fp32;
            next.fp32 = Some(Arc::clone(&reference));
            next.fallback = Some(current.fallback.unwrap_or(reason));
            next
        });
        if previous.fallback.is_none() {
            self.counters.fallback_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(reason = %reason, "fallback to fp32 forced");
        }
        Ok(())
    }

    /// Computes an embedding from model input features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UninitializedModel`] if no model is installed and
    /// [`Error::DimensionMismatch`] for a wrongly sized input.
    pub fn infer(&self, features: &[f32]) -> Result<Vec<f32>> {
        self.infer_detailed(features).map(|e| e.vector)
    }

    /// Like [`QuantizationEngine::infer`], also reporting which model answered.
    pub fn infer_detailed(&self, features: &[f32]) -> Result<Embedding> {
        let state = self.state.load_full();
        match (state.mode, &state.int8, &state.fp32) {
            (ModelMode::Int8, Some(int8), fp32) => self.infer_int8(&state, int8, fp32.as_ref(), features),
            (_, _, Some(fp32)) => {
                let started = Instant::now();
                let vector = fp32.forward(features)?;
                self.counters.record(ModelMode::Fp32, started.elapsed());
                Ok(Embedding {
                    vector,
                    mode: ModelMode::Fp32,
                    fallback: state.fallback,
                })
            }
            _ => Err(Error::UninitializedModel),
        }
    }

    fn infer_int8(
        &self,
        state: &RuntimeState,
        int8: &QuantizedModel,
        fp32: Option<&Arc<EmbeddingModel>>,
        features: &[f32],
    ) -> Result<Embedding> {
        let started = Instant::now();
        let vector = int8.forward(features)?;
        let elapsed = started.elapsed();
        self.counters.record(ModelMode::Int8, elapsed);

        let Some(reference) = fp32.filter(|_| self.should_shadow(&state.config)) else {
            return Ok(Embedding {
                vector,
                mode: ModelMode::Int8,
                fallback: None,
            });
        };

        self.counters.shadow_checks.fetch_add(1, Ordering::Relaxed);
        let fp32_started = Instant::now();
        let expected = reference.forward(features)?;
        self.counters.record(ModelMode::Fp32, fp32_started.elapsed());

        let similarity = output_similarity(&expected, &vector);
        let too_slow = state
            .config
            .max_latency_ms
            .is_some_and(|ms| elapsed > Duration::from_millis(ms));
        let reason = if similarity.is_nan() || similarity < state.config.fallback_threshold {
            Some(FallbackReason::AccuracyDrop)
        } else if too_slow {
            Some(FallbackReason::InferenceSlow)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                if self.latch(reference, Some(similarity), reason) {
                    tracing::warn!(
                        similarity,
                        latency_us = elapsed.as_micros(),
                        reason = %reason,
                        "shadow check failed, falling back to fp32"
                    );
                }
                Ok(Embedding {
                    vector: expected,
                    mode: ModelMode::Fp32,
                    fallback: Some(reason),
                })
            }
            None => Ok(Embedding {
                vector,
                mode: ModelMode::Int8,
                fallback: None,
            }),
        }
    }

    fn should_shadow(&self, config: &QuantizationConfig) -> bool {
        if !config.enable_auto_fallback || config.shadow_sample_rate <= 0.0 {
            return false;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let every = (1.0 / config.shadow_sample_rate).round().max(1.0) as u64;
        self.counters.shadow_tick.fetch_add(1, Ordering::Relaxed) % every == 0
    }

    /// Extracts features from `text` and embeds them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UninitializedModel`] if no model is installed.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        let features = match &self.extractor {
            Some(extractor) => extractor.extract(text),
            None => {
                let dim = self.state.load().input_dim().ok_or(Error::UninitializedModel)?;
                HashingFeatureExtractor::new(dim).extract(text)
            }
        };
        self.infer_detailed(&features)
    }

    /// Extracts the model input for `text` without running a model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UninitializedModel`] if no model is installed and no
    /// extractor was configured.
    pub fn features(&self, text: &str) -> Result<Vec<f32>> {
        match &self.extractor {
            Some(extractor) => Ok(extractor.extract(text)),
            None => {
                let dim = self.state.load().input_dim().ok_or(Error::UninitializedModel)?;
                Ok(HashingFeatureExtractor::new(dim).extract(text))
            }
        }
    }

    /// The int8 model and its validation similarity, if any.
    ///
    /// `None` while a fallback is latched: a model the engine stopped serving
    /// must not be persisted and reactivated on the next start.
    #[must_use]
    pub fn artifact(&self) -> Option<QuantizationArtifact> {
        let state = self.state.load();
        if state.fallback.is_some() {
            return None;
        }
        let model = state.int8.as_ref()?;
        Some(QuantizationArtifact {
            model: QuantizedModel::clone(model),
            measured_similarity: state.last_similarity.unwrap_or(0.0),
        })
    }

    /// Current mode, fallback state and inference counters.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let state = self.state.load();
        let c = &self.counters;
        EngineStatus {
            mode: state.mode,
            initialized: state.fp32.is_some() || state.int8.is_some(),
            last_similarity: state.last_similarity,
            fallback: state.fallback.is_some(),
            fallback_reason: state.fallback,
            compression_ratio: state.int8.as_ref().map(|m| m.compression_ratio()),
            int8_inferences: c.int8_inferences.load(Ordering::Relaxed),
            fp32_inferences: c.fp32_inferences.load(Ordering::Relaxed),
            shadow_checks: c.shadow_checks.load(Ordering::Relaxed),
            fallback_count: c.fallback_count.load(Ordering::Relaxed),
            avg_int8_latency: EngineCounters::average(&c.int8_inferences, &c.int8_nanos),
            avg_fp32_latency: EngineCounters::average(&c.fp32_inferences, &c.fp32_nanos),
        }
    }
}
