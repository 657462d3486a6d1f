//! HnswIndex search methods.

use super::HnswIndex;
use crate::error::Result;
use crate::item::Metadata;
use crate::index::hnsw::params::SearchQuality;

impl HnswIndex {
    /// Searches for the `k` nearest items.
    ///
    /// Returns `(id, distance)` pairs ascending by distance, at most `k` long.
    /// An empty index yields an empty result. The beam width is
    /// `max(ef_search, k)`; an `ef_search` covering the whole index makes the
    /// result exact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DimensionMismatch`] if the query has the wrong length.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(String, f32)>> {
        self.check_dimension(query.len())?;
        Ok(self.resolve(self.graph.search(query, k, ef_search)))
    }

    /// Like [`HnswIndex::search`], with each hit's metadata read in the same pass.
    ///
    /// Unlike a later [`HnswIndex::metadata`] lookup, this never misses an item
    /// that is reachable in the graph but whose insert has not returned yet.
    pub fn search_with_metadata(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(String, f32, Metadata)>> {
        self.check_dimension(query.len())?;
        let hits = self.graph.search(query, k, ef_search);
        let records = self.records.read();
        Ok(hits
            .into_iter()
            .filter_map(|(node, dist)| {
                records
                    .get(node)
                    .map(|r| (r.id.clone(), dist, r.metadata.clone()))
            })
            .collect())
    }

    /// Searches with the `ef_search` of a quality profile.
    pub fn search_with_quality(
        &self,
        query: &[f32],
        k: usize,
        quality: SearchQuality,
    ) -> Result<Vec<(String, f32)>> {
        self.search(query, k, quality.ef_search(k))
    }

    /// Brute-force search over every item. Ground truth for recall checks.
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        self.check_dimension(query.len())?;
        Ok(self.resolve(self.graph.search_exact(query, k)))
    }
}
