//! HnswIndex constructors.

use super::{HnswIndex, DEFAULT_LEVEL_SEED};
use crate::distance::{CpuDistance, DistanceMetric};
use crate::error::{Error, Result};
use crate::index::hnsw::graph::HnswGraph;
use crate::index::hnsw::params::HnswParams;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rustc_hash::FxHashMap;

impl HnswIndex {
    /// Creates a new HNSW index with parameters tuned for the dimension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use lodestar_core::{DistanceMetric, HnswIndex};
    ///
    /// let index = HnswIndex::new(384, DistanceMetric::Cosine)?;
    /// assert!(index.is_empty());
    /// # Ok::<(), lodestar_core::Error>(())
    /// ```
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::with_params(dimension, metric, HnswParams::auto(dimension))
    }

    /// Creates a new HNSW index with custom parameters.
    ///
    /// Level assignment uses a fixed default seed, so two indexes built from
    /// the same insertion sequence have identical graphs.
    pub fn with_params(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        Self::with_seed(dimension, metric, params, DEFAULT_LEVEL_SEED)
    }

    /// Creates a new HNSW index whose level assignment is seeded with `seed`.
    pub fn with_seed(
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
        seed: u64,
    ) -> Result<Self> {
        Self::build(dimension, metric, params, seed, Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Creates a new HNSW index drawing node levels from `rng`.
    ///
    /// A reloaded snapshot of this index reseeds from [`DEFAULT_LEVEL_SEED`].
    pub fn with_rng(
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
        rng: impl RngCore + Send + 'static,
    ) -> Result<Self> {
        Self::build(dimension, metric, params, DEFAULT_LEVEL_SEED, Box::new(rng))
    }

    pub(in crate::index::hnsw) fn build(
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
        seed: u64,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be > 0".into()));
        }
        params.validate()?;
        tracing::debug!(
            dimension,
            metric = %metric,
            max_connections = params.max_connections,
            ef_construction = params.ef_construction,
            "creating hnsw index"
        );
        Ok(Self {
            dimension,
            metric,
            seed,
            graph: HnswGraph::new(CpuDistance::new(metric), params, rng),
            records: RwLock::new(Vec::new()),
            ids: RwLock::new(FxHashMap::default()),
            writer: Mutex::new(()),
        })
    }
}
