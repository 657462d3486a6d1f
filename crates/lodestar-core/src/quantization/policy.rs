//! Accuracy policy: held-out validation and the accept / warn / reject decision.

use super::model::{EmbeddingModel, QuantizedModel};
use crate::config::QuantizationConfig;
use crate::distance::cosine_similarity;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Outcome of comparing a measured similarity against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// At or above the warning threshold.
    Accept,
    /// Between the fallback threshold (inclusive) and the warning threshold.
    AcceptWithWarning,
    /// Below the fallback threshold, or not a number.
    Reject,
}

impl Verdict {
    /// True unless rejected.
    #[must_use]
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// Two-threshold accuracy policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyPolicy {
    /// Similarity at or above which int8 is accepted silently.
    pub warning_threshold: f32,
    /// Similarity below which int8 is rejected.
    pub fallback_threshold: f32,
}

impl AccuracyPolicy {
    /// Policy with the thresholds of `config`.
    #[must_use]
    pub fn from_config(config: &QuantizationConfig) -> Self {
        Self {
            warning_threshold: config.warning_threshold,
            fallback_threshold: config.fallback_threshold,
        }
    }

    /// Classifies a measured similarity. Equality with a threshold counts as
    /// meeting it.
    #[must_use]
    pub fn evaluate(&self, similarity: f32) -> Verdict {
        if similarity.is_nan() || similarity < self.fallback_threshold {
            Verdict::Reject
        } else if similarity < self.warning_threshold {
            Verdict::AcceptWithWarning
        } else {
            Verdict::Accept
        }
    }
}

/// Number of trailing samples held out for validation: `round(n * fraction)`,
/// kept within `1..n` so both halves are non-empty.
#[must_use]
pub fn validation_split(samples: usize, fraction: f64) -> usize {
    if samples < 2 {
        return 0;
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let held_out = (samples as f64 * fraction).round().max(0.0) as usize;
    held_out.clamp(1, samples - 1)
}

/// Cosine similarity between two model outputs; two zero vectors agree fully.
#[must_use]
pub fn output_similarity(a: &[f32], b: &[f32]) -> f32 {
    let a_zero = a.iter().all(|&x| x == 0.0);
    let b_zero = b.iter().all(|&x| x == 0.0);
    if a_zero && b_zero {
        1.0
    } else {
        cosine_similarity(a, b)
    }
}

/// Mean output similarity between the fp32 and int8 models over `samples`.
///
/// Returns `NaN` for an empty sample set, which every policy rejects.
pub fn measure_similarity(
    reference: &EmbeddingModel,
    quantized: &QuantizedModel,
    samples: &[Vec<f32>],
) -> Result<f32> {
    if samples.is_empty() {
        return Ok(f32::NAN);
    }
    let mut total = 0.0_f64;
    for sample in samples {
        let expected = reference.forward(sample)?;
        let actual = quantized.forward(sample)?;
        total += f64::from(output_similarity(&expected, &actual));
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mean = (total / samples.len() as f64) as f32;
    Ok(mean)
}
