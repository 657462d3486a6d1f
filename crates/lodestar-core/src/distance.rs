//! Distance metrics and the engine abstraction used by the HNSW graph.
//!
//! All metrics are expressed as *distances* (smaller is closer) so the graph
//! never needs to know which metric it runs on. [`DistanceMetric::score`]
//! converts a distance back to the similarity score reported to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric for vector similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`. Score is the cosine similarity.
    #[default]
    Cosine,
    /// Negative inner product. Score is the inner product.
    #[serde(alias = "innerProduct", alias = "dot_product")]
    InnerProduct,
    /// Euclidean (L2) distance. Score is `1 / (1 + d)`.
    #[serde(alias = "euclidean")]
    L2,
}

impl DistanceMetric {
    /// Computes the distance between two vectors of equal length.
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::InnerProduct => -dot_product(a, b),
            Self::L2 => l2_squared(a, b).sqrt(),
        }
    }

    /// Converts a distance produced by [`Self::distance`] into a similarity score.
    ///
    /// Higher is more similar for every metric.
    #[inline]
    #[must_use]
    pub fn score(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::InnerProduct => -distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Cosine => 0,
            Self::InnerProduct => 1,
            Self::L2 => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Cosine),
            1 => Some(Self::InnerProduct),
            2 => Some(Self::L2),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
            Self::L2 => "l2",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "inner_product" | "innerproduct" | "dot" | "ip" => Ok(Self::InnerProduct),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(format!("unknown distance metric '{other}'")),
        }
    }
}

/// Trait for distance computation engines.
///
/// The graph is generic over this trait so alternative kernels can be
/// swapped in without touching the construction or search code.
pub trait DistanceEngine: Send + Sync {
    /// Computes distance between two vectors.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Returns the metric type for this engine.
    fn metric(&self) -> DistanceMetric;
}

/// Scalar CPU distance computation.
#[derive(Debug, Clone, Copy)]
pub struct CpuDistance {
    metric: DistanceMetric,
}

impl CpuDistance {
    /// Creates a new CPU distance engine with the given metric.
    #[must_use]
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl DistanceEngine for CpuDistance {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.metric.distance(a, b)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine similarity. Returns 0.0 when either vector has zero norm.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Normalizes a vector to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
