//! HNSW snapshot serialization and on-disk layout.
//!
//! # On-Disk Format
//!
//! A saved index is a directory with two bincode files:
//! - `hnsw_meta.bin`: [`HnswMeta`] (format version, dimension, metric,
//!   params, item count and the SHA-256 of the graph file)
//! - `hnsw_graph.bin`: the full [`IndexSnapshot`] (item records and arena)
//!
//! Loading verifies the checksum before decoding the graph.

use super::graph::{GraphSnapshot, HnswGraph};
use super::index::{HnswIndex, ItemRecord};
use super::params::HnswParams;
use crate::distance::{CpuDistance, DistanceMetric};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Current snapshot format version.
pub const FORMAT_VERSION: u32 = 1;

const META_FILE: &str = "hnsw_meta.bin";
const GRAPH_FILE: &str = "hnsw_graph.bin";

/// Index metadata as stored in `hnsw_meta.bin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswMeta {
    /// Snapshot format version.
    pub format_version: u32,
    /// Vector dimension.
    pub dimension: usize,
    /// Metric discriminant (0 = cosine, 1 = inner product, 2 = l2).
    pub metric: u8,
    /// Construction parameters.
    pub params: HnswParams,
    /// Number of items.
    pub len: usize,
    /// Hex SHA-256 of `hnsw_graph.bin`.
    pub graph_sha256: String,
}

/// Complete in-memory snapshot of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IndexSnapshot {
    pub(crate) format_version: u32,
    pub(crate) dimension: usize,
    pub(crate) metric: u8,
    pub(crate) params: HnswParams,
    pub(crate) seed: u64,
    pub(crate) records: Vec<ItemRecord>,
    pub(crate) graph: GraphSnapshot,
}

impl HnswIndex {
    /// Serializes the index to an opaque binary snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let graph = self.graph.snapshot();
        let records = self.records.read()[..graph.nodes.len()].to_vec();
        let snapshot = IndexSnapshot {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            metric: self.metric.as_u8(),
            params: *self.graph.params(),
            seed: self.seed,
            records,
            graph,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Rebuilds an index from bytes produced by [`HnswIndex::to_bytes`].
    ///
    /// The reloaded index answers searches exactly like the original.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the snapshot is internally inconsistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: IndexSnapshot = bincode::deserialize(bytes)?;
        Self::from_snapshot(snapshot)
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        if snapshot.format_version != FORMAT_VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }
        let metric = metric_from_u8(snapshot.metric)?;
        snapshot.params.validate()?;
        if snapshot.records.len() != snapshot.graph.nodes.len() {
            return Err(Error::Corrupted(format!(
                "{} records for {} graph nodes",
                snapshot.records.len(),
                snapshot.graph.nodes.len()
            )));
        }
        if let Some(bad) = snapshot
            .graph
            .nodes
            .iter()
            .position(|n| n.vector.len() != snapshot.dimension)
        {
            return Err(Error::Corrupted(format!("node {bad} has wrong dimension")));
        }

        let mut ids = FxHashMap::default();
        for (node, record) in snapshot.records.iter().enumerate() {
            if ids.insert(record.id.clone(), node).is_some() {
                return Err(Error::Corrupted(format!("duplicate id '{}'", record.id)));
            }
        }

        // Reseed from the stored seed advanced by the item count, so later
        // inserts do not replay the levels of the first ones.
        let rng = StdRng::seed_from_u64(snapshot.seed ^ snapshot.records.len() as u64);
        let graph = HnswGraph::from_snapshot(
            CpuDistance::new(metric),
            snapshot.params,
            Box::new(rng),
            snapshot.graph,
        )?;

        Ok(Self {
            dimension: snapshot.dimension,
            metric,
            seed: snapshot.seed,
            graph,
            records: RwLock::new(snapshot.records),
            ids: RwLock::new(ids),
            writer: Mutex::new(()),
        })
    }

    /// Writes the index into `dir` (created if missing).
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let bytes = self.to_bytes()?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        let mut writer = BufWriter::new(File::create(dir.join(GRAPH_FILE))?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        let meta = HnswMeta {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            metric: self.metric.as_u8(),
            params: *self.graph.params(),
            len: self.len(),
            graph_sha256: checksum,
        };
        let meta_writer = BufWriter::new(File::create(dir.join(META_FILE))?);
        bincode::serialize_into(meta_writer, &meta)?;

        tracing::info!(path = %dir.display(), items = meta.len, "hnsw index saved");
        Ok(())
    }

    /// Loads an index previously written with [`HnswIndex::save`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] on checksum or metadata mismatch.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let meta = load_meta(dir)?;
        if meta.format_version != FORMAT_VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported format version {}",
                meta.format_version
            )));
        }

        let bytes = std::fs::read(dir.join(GRAPH_FILE))?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        if checksum != meta.graph_sha256 {
            return Err(Error::Corrupted(format!(
                "{GRAPH_FILE} checksum mismatch (expected {}, found {checksum})",
                meta.graph_sha256
            )));
        }

        let index = Self::from_bytes(&bytes)?;
        if index.dimension != meta.dimension
            || index.metric.as_u8() != meta.metric
            || index.len() != meta.len
        {
            return Err(Error::Corrupted(format!(
                "{META_FILE} does not describe {GRAPH_FILE}"
            )));
        }

        tracing::info!(path = %dir.display(), items = index.len(), "hnsw index loaded");
        Ok(index)
    }
}

/// Reads `hnsw_meta.bin` from `dir`.
pub fn load_meta(dir: &Path) -> Result<HnswMeta> {
    let reader = BufReader::new(File::open(dir.join(META_FILE))?);
    Ok(bincode::deserialize_from(reader)?)
}

fn metric_from_u8(value: u8) -> Result<DistanceMetric> {
    DistanceMetric::from_u8(value)
        .ok_or_else(|| Error::Corrupted(format!("unknown distance metric {value}")))
}
