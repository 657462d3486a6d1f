//! Text to feature-vector extraction.

use crate::distance::l2_normalize;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Turns query text into the input vector of an embedding model.
pub trait FeatureExtractor: Send + Sync {
    /// Width of the produced vectors.
    fn dimension(&self) -> usize;

    /// Extracts features from `text`. Must be deterministic.
    fn extract(&self, text: &str) -> Vec<f32>;
}

/// Signed feature hashing of lowercase alphanumeric tokens and their bigrams.
///
/// Each token hashes to a bucket and a sign; bigrams contribute half weight.
/// The output is L2-normalized, or all zeros for text without tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingFeatureExtractor {
    dimension: usize,
    bigrams: bool,
}

const BIGRAM_WEIGHT: f32 = 0.5;

impl HashingFeatureExtractor {
    /// Extractor producing `dimension`-wide vectors (at least 1), bigrams enabled.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            bigrams: true,
        }
    }

    /// Enables or disables bigram features.
    #[must_use]
    pub fn with_bigrams(mut self, bigrams: bool) -> Self {
        self.bigrams = bigrams;
        self
    }

    fn accumulate(&self, features: &mut [f32], key: &(impl Hash + ?Sized), weight: f32) {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        // SAFETY: the remainder is below `dimension`, which is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        features[bucket] += sign * weight;
    }
}

impl FeatureExtractor for HashingFeatureExtractor {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn extract(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut features = vec![0.0; self.dimension];
        for token in &tokens {
            self.accumulate(&mut features, *token, 1.0);
        }
        if self.bigrams {
            for pair in tokens.windows(2) {
                self.accumulate(&mut features, &(pair[0], pair[1]), BIGRAM_WEIGHT);
            }
        }
        l2_normalize(&mut features);
        features
    }
}
