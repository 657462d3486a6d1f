//! `HnswIndex`: the id- and metadata-aware index built on the HNSW graph.
//!
//! # Module Organization
//!
//! - `constructors`: creation with default, custom, seeded or injected randomness
//! - `search`: approximate, exact and quality-profile searches

mod constructors;
mod search;

use super::graph::HnswGraph;
use super::layer::NodeId;
use super::params::HnswParams;
use crate::distance::{CpuDistance, DistanceMetric};
use crate::error::{Error, Result};
use crate::item::{IndexedItem, Metadata};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Level seed used when the caller does not provide one.
pub const DEFAULT_LEVEL_SEED: u64 = 0x5DEE_CE66_D1A4_B5B5;

/// Per-node item data, stored at the same arena position as the graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    pub(crate) id: String,
    pub(crate) metadata: Metadata,
}

/// Approximate nearest-neighbor index over string-identified items.
///
/// Searches run concurrently; inserts are serialized by a single writer lock.
/// Ids are unique for the lifetime of the index and items cannot be removed.
pub struct HnswIndex {
    pub(super) dimension: usize,
    pub(super) metric: DistanceMetric,
    pub(super) seed: u64,
    pub(super) graph: HnswGraph<CpuDistance>,
    /// Item records, indexed by node id
    pub(super) records: RwLock<Vec<ItemRecord>>,
    pub(super) ids: RwLock<FxHashMap<String, NodeId>>,
    pub(super) writer: Mutex<()>,
}

/// Structural statistics of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of items.
    pub len: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Highest populated layer.
    pub max_layer: usize,
    /// Id of the entry-point item, if any.
    pub entry_point: Option<String>,
    /// Number of nodes present on each layer, bottom first.
    pub layer_sizes: Vec<usize>,
    /// Mean number of layer-0 links per node.
    pub avg_degree_layer0: f64,
    /// Rough resident size of vectors, links and records.
    pub estimated_memory_bytes: usize,
}

impl HnswIndex {
    /// Inserts an item.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateId`] if the id is already indexed (size unchanged)
    /// - [`Error::DimensionMismatch`] if the vector has the wrong length
    /// - [`Error::CapacityExceeded`] once `max_elements` items are stored
    /// - [`Error::InvalidModel`] if the vector contains NaN or infinity
    pub fn insert(&self, item: IndexedItem) -> Result<()> {
        self.check_dimension(item.vector.len())?;
        if item.vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidModel(format!(
                "vector for '{}' contains non-finite values",
                item.id
            )));
        }

        let _writer = self.writer.lock();
        if self.ids.read().contains_key(&item.id) {
            return Err(Error::DuplicateId(item.id));
        }
        let max_elements = self.graph.params().max_elements;
        if self.graph.len() >= max_elements {
            return Err(Error::CapacityExceeded(max_elements));
        }

        // The record goes in first so any node a reader can reach resolves.
        self.records.write().push(ItemRecord {
            id: item.id.clone(),
            metadata: item.metadata,
        });
        let node = self.graph.insert(item.vector);
        self.ids.write().insert(item.id, node);
        Ok(())
    }

    /// Inserts items one by one, returning one result per item.
    pub fn insert_batch(&self, items: impl IntoIterator<Item = IndexedItem>) -> Vec<Result<()>> {
        let results: Vec<Result<()>> = items.into_iter().map(|item| self.insert(item)).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = results.len(), "batch insert had failures");
        }
        results
    }

    /// Returns the number of items in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if an item with this id is indexed.
    ///
    /// Becomes true when [`HnswIndex::insert`] returns; searches may reach the
    /// item slightly earlier.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.read().contains_key(id)
    }

    /// Returns the stored vector and metadata of an item.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<(Vec<f32>, Metadata)> {
        let node = *self.ids.read().get(id)?;
        let vector = self.graph.vector(node)?;
        let metadata = self.records.read().get(node)?.metadata.clone();
        Some((vector, metadata))
    }

    /// Returns the metadata of an item.
    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<Metadata> {
        let node = *self.ids.read().get(id)?;
        self.records.read().get(node).map(|r| r.metadata.clone())
    }

    /// Vector dimension accepted by this index.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Distance metric of this index.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Construction parameters of this index.
    #[must_use]
    pub fn params(&self) -> HnswParams {
        *self.graph.params()
    }

    /// Computes structural statistics.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let (layer_sizes, avg_degree_layer0) = self.graph.layer_profile();
        let entry = self.graph.entry_point();
        let records = self.records.read();
        let len = self.len();

        let link_bytes: usize = layer_sizes
            .iter()
            .enumerate()
            .map(|(layer, &count)| {
                count * self.graph.params().max_links(layer) * std::mem::size_of::<NodeId>()
            })
            .sum();
        let record_bytes: usize = records
            .iter()
            .take(len)
            .map(|r| r.id.len() + r.metadata.len() * 48 + std::mem::size_of::<ItemRecord>())
            .sum();

        IndexStats {
            len,
            dimension: self.dimension,
            metric: self.metric,
            max_layer: entry.map_or(0, |(_, level)| level),
            entry_point: entry.and_then(|(node, _)| records.get(node).map(|r| r.id.clone())),
            layer_sizes,
            avg_degree_layer0,
            estimated_memory_bytes: len * self.dimension * std::mem::size_of::<f32>()
                + link_bytes
                + record_bytes,
        }
    }

    pub(super) fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    pub(super) fn resolve(&self, hits: Vec<(NodeId, f32)>) -> Vec<(String, f32)> {
        let records = self.records.read();
        hits.into_iter()
            .filter_map(|(node, dist)| records.get(node).map(|r| (r.id.clone(), dist)))
            .collect()
    }
}
