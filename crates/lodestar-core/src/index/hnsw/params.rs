//! HNSW index parameters and search quality profiles.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// HNSW index parameters for tuning performance and recall.
///
/// Use [`HnswParams::auto`] for tuning based on vector dimension,
/// or [`HnswParams::custom`] for specific workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Number of links per node above layer 0 (M). Layer 0 allows `2 * M`.
    /// Higher = better recall, more memory, slower insert.
    pub max_connections: usize,
    /// Size of the candidate list during construction.
    /// Higher = better graph quality, slower indexing.
    pub ef_construction: usize,
    /// Default candidate list size at query time.
    pub ef_search: usize,
    /// Hard capacity of the index. Inserts beyond it are rejected.
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::auto(384)
    }
}

impl HnswParams {
    /// Creates parameters tuned for the vector dimension.
    #[must_use]
    pub fn auto(dimension: usize) -> Self {
        match dimension {
            0..=768 => Self {
                max_connections: 16,
                ef_construction: 200,
                ef_search: 64,
                max_elements: 100_000,
            },
            _ => Self {
                max_connections: 24,
                ef_construction: 300,
                ef_search: 128,
                max_elements: 100_000,
            },
        }
    }

    /// Creates parameters favouring build speed over recall.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_connections: 12,
            ef_construction: 100,
            ef_search: 48,
            max_elements: 100_000,
        }
    }

    /// Creates parameters optimized for high recall.
    #[must_use]
    pub fn high_recall(dimension: usize) -> Self {
        let base = Self::auto(dimension);
        Self {
            max_connections: base.max_connections + 8,
            ef_construction: base.ef_construction + 200,
            ef_search: base.ef_search * 2,
            ..base
        }
    }

    /// Creates custom parameters.
    #[must_use]
    pub const fn custom(
        max_connections: usize,
        ef_construction: usize,
        ef_search: usize,
        max_elements: usize,
    ) -> Self {
        Self {
            max_connections,
            ef_construction,
            ef_search,
            max_elements,
        }
    }

    /// Maximum links kept for a node at `layer`.
    #[inline]
    #[must_use]
    pub fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_connections * 2
        } else {
            self.max_connections
        }
    }

    /// Checks the parameters for values the graph cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections < 2 {
            return Err(Error::InvalidConfig(format!(
                "max_connections must be >= 2, got {}",
                self.max_connections
            )));
        }
        if self.ef_construction < self.max_connections {
            return Err(Error::InvalidConfig(format!(
                "ef_construction ({}) must be >= max_connections ({})",
                self.ef_construction, self.max_connections
            )));
        }
        if self.ef_search == 0 {
            return Err(Error::InvalidConfig("ef_search must be > 0".into()));
        }
        if self.max_elements == 0 {
            return Err(Error::InvalidConfig("max_elements must be > 0".into()));
        }
        Ok(())
    }
}

/// Search quality profile controlling the recall/latency tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchQuality {
    /// Fast search with `ef_search=64`.
    Fast,
    /// Balanced search with `ef_search=128`.
    #[default]
    Balanced,
    /// Accurate search with `ef_search=256`.
    Accurate,
    /// High recall search with `ef_search=512`.
    HighRecall,
    /// Custom `ef_search` value.
    Custom(usize),
}

impl SearchQuality {
    /// Returns the `ef_search` value for this quality profile.
    #[must_use]
    pub fn ef_search(&self, k: usize) -> usize {
        match self {
            Self::Fast => 64.max(k * 2),
            Self::Balanced => 128.max(k * 4),
            Self::Accurate => 256.max(k * 8),
            Self::HighRecall => 512.max(k * 16),
            Self::Custom(ef) => (*ef).max(k),
        }
    }
}
