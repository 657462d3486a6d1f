//! Vector index abstraction and the HNSW implementation.

pub mod hnsw;

pub use hnsw::{HnswIndex, HnswParams, IndexStats, SearchQuality};

use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::item::{IndexedItem, Metadata};

/// Index seen by the query orchestrator.
///
/// Implementations must support concurrent `search` calls.
pub trait VectorIndex: Send + Sync {
    /// Inserts an item. Duplicate ids are rejected.
    fn insert(&self, item: IndexedItem) -> Result<()>;

    /// Searches for the `k` nearest items as `(id, distance, metadata)`, ascending.
    ///
    /// Metadata is resolved together with the id, so a hit on an item whose
    /// insert is still in flight carries its metadata.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(String, f32, Metadata)>>;

    /// Returns the metadata of an item.
    fn metadata(&self, id: &str) -> Option<Metadata>;

    /// Returns the number of items in the index.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance metric used to turn distances into scores.
    fn metric(&self) -> DistanceMetric;
}

impl VectorIndex for HnswIndex {
    fn insert(&self, item: IndexedItem) -> Result<()> {
        HnswIndex::insert(self, item)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(String, f32, Metadata)>> {
        HnswIndex::search_with_metadata(self, query, k, ef_search)
    }

    fn metadata(&self, id: &str) -> Option<Metadata> {
        HnswIndex::metadata(self, id)
    }

    fn len(&self) -> usize {
        HnswIndex::len(self)
    }

    fn metric(&self) -> DistanceMetric {
        HnswIndex::metric(self)
    }
}
