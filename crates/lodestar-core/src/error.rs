//! Error types for Lodestar.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Lodestar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Lodestar operations.
///
/// Index and quantization failures are recoverable and are surfaced as
/// values; only [`Error::UninitializedModel`] is a hard precondition failure.
#[derive(Error, Debug)]
pub enum Error {
    /// An item with this id is already present in the index.
    #[error("Duplicate id '{0}': ids must be unique for the life of the index")]
    DuplicateId(String),

    /// Vector dimension does not match the index or model dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The index already holds `max_elements` items.
    #[error("Index capacity exceeded: max_elements is {0}")]
    CapacityExceeded(usize),

    /// Fewer calibration samples than the configured minimum.
    #[error("Insufficient calibration data: got {provided} samples, need at least {required}")]
    InsufficientCalibrationData {
        /// Samples supplied by the caller.
        provided: usize,
        /// Configured minimum.
        required: usize,
    },

    /// Quantized outputs diverge too far from the fp32 reference.
    #[error("Accuracy below threshold: similarity {similarity:.4} < {threshold:.4}")]
    AccuracyBelowThreshold {
        /// Measured cosine similarity between int8 and fp32 outputs.
        similarity: f32,
        /// Rejection threshold in force.
        threshold: f32,
    },

    /// Quantization working set does not fit the memory budget.
    #[error("Memory budget exceeded: quantization needs {required_bytes} bytes, budget is {budget_bytes} bytes")]
    MemoryBudgetExceeded {
        /// Estimated peak working set.
        required_bytes: u64,
        /// Configured budget.
        budget_bytes: u64,
    },

    /// The query did not complete before its deadline.
    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// No model (int8 or fp32) has been initialized.
    #[error("No model initialized: call initialize() before inference")]
    UninitializedModel,

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model weights or shapes are inconsistent.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Persisted data is inconsistent or failed its integrity check.
    #[error("Corrupted snapshot: {0}")]
    Corrupted(String),

    /// Binary (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration source could not be read or extracted.
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl Error {
    /// Returns true if the caller can retry after adjusting input or configuration.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UninitializedModel | Self::Corrupted(_))
    }
}
