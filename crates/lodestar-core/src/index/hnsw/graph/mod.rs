//! HNSW Graph Structure
//!
//! Implements the hierarchical navigable small world graph described in the
//! Malkov & Yashunin paper, over an arena of nodes addressed by [`NodeId`].
//!
//! # Module Organization
//!
//! - `insert`: node insertion and link publication
//! - `search`: k-NN search, exact scan, and layer-level search
//! - `neighbors`: heuristic neighbor selection and back-link pruning
//!
//! # Concurrency
//!
//! Writers are serialized by the level-generator mutex. Readers never take
//! that mutex: they only hold the arena read lock plus short per-list locks.
//! A new node is fully linked on layer `l` before any other node links to it
//! on a layer `>= l`, and the entry point moves only after every layer is
//! published, so readers never walk into a partially linked node.

mod insert;
mod neighbors;
mod search;

use super::layer::{GraphNode, LevelGenerator, NodeId};
use super::params::HnswParams;
use crate::distance::DistanceEngine;
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Entry point of the graph: node id and its level.
pub(crate) type EntryPoint = Option<(NodeId, usize)>;

/// Layered proximity graph over an arena of nodes.
///
/// # Type Parameters
///
/// * `D` - Distance engine
pub(crate) struct HnswGraph<D: DistanceEngine> {
    /// Distance computation engine
    pub(super) distance: D,
    /// Arena of nodes (node_id -> node)
    pub(super) nodes: RwLock<Vec<Arc<GraphNode>>>,
    /// Entry point for search (highest layer node, first inserted on ties)
    pub(super) entry: RwLock<EntryPoint>,
    /// Number of fully published nodes
    pub(super) count: AtomicUsize,
    /// Level source; its lock also serializes writers
    pub(super) levels: Mutex<LevelGenerator>,
    pub(super) params: HnswParams,
    /// Neighbor diversification factor (1.0 = classic HNSW heuristic)
    pub(super) alpha: f32,
}

impl<D: DistanceEngine> HnswGraph<D> {
    pub(crate) fn new(distance: D, params: HnswParams, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            distance,
            nodes: RwLock::new(Vec::new()),
            entry: RwLock::new(None),
            count: AtomicUsize::new(0),
            levels: Mutex::new(LevelGenerator::new(params.max_connections, rng)),
            params,
            alpha: 1.0,
        }
    }

    /// Returns the number of published nodes.
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn entry_point(&self) -> EntryPoint {
        *self.entry.read()
    }

    pub(crate) fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Clones the vector stored for `node`.
    pub(crate) fn vector(&self, node: NodeId) -> Option<Vec<f32>> {
        self.nodes.read().get(node).map(|n| n.vector.clone())
    }

    /// Node count per layer and mean layer-0 degree.
    // SAFETY: degree sum and node count are far below 2^52, exact in f64.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn layer_profile(&self) -> (Vec<usize>, f64) {
        let nodes = self.nodes.read();
        let published = &nodes[..self.len().min(nodes.len())];
        let top = published.iter().map(|n| n.level).max().unwrap_or(0);
        let mut sizes = vec![0_usize; top + 1];
        let mut degree_sum = 0_usize;
        for node in published {
            for size in sizes.iter_mut().take(node.level + 1) {
                *size += 1;
            }
            degree_sum += node.degree(0);
        }
        let avg_degree = if published.is_empty() {
            0.0
        } else {
            degree_sum as f64 / published.len() as f64
        };
        (sizes, avg_degree)
    }

    /// Captures the published arena.
    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        // Hold the writer lock so the arena, links and entry point agree.
        let _writer = self.levels.lock();
        let nodes = self.nodes.read();
        let published = &nodes[..self.len().min(nodes.len())];
        GraphSnapshot {
            entry: *self.entry.read(),
            nodes: published
                .iter()
                .map(|n| NodeSnapshot {
                    vector: n.vector.clone(),
                    links: n.all_links(),
                })
                .collect(),
        }
    }

    /// Rebuilds a graph from a snapshot, checking every link.
    pub(crate) fn from_snapshot(
        distance: D,
        params: HnswParams,
        rng: Box<dyn RngCore + Send>,
        snapshot: GraphSnapshot,
    ) -> Result<Self> {
        let len = snapshot.nodes.len();
        for (idx, node) in snapshot.nodes.iter().enumerate() {
            if node.links.is_empty() {
                return Err(Error::Corrupted(format!("node {idx} has no layer 0")));
            }
            if let Some(bad) = node.links.iter().flatten().find(|&&n| n >= len) {
                return Err(Error::Corrupted(format!(
                    "node {idx} links to missing node {bad}"
                )));
            }
        }
        match snapshot.entry {
            None if len > 0 => {
                return Err(Error::Corrupted("non-empty graph without entry point".into()));
            }
            Some((ep, level)) if ep >= len || snapshot.nodes[ep].links.len() != level + 1 => {
                return Err(Error::Corrupted(format!("invalid entry point {ep}")));
            }
            _ => {}
        }

        let graph = Self::new(distance, params, rng);
        {
            let mut nodes = graph.nodes.write();
            nodes.extend(
                snapshot
                    .nodes
                    .into_iter()
                    .map(|n| Arc::new(GraphNode::with_links(n.vector, n.links))),
            );
        }
        *graph.entry.write() = snapshot.entry;
        graph.count.store(len, Ordering::Release);
        Ok(graph)
    }
}

/// Serializable form of the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GraphSnapshot {
    pub(crate) entry: EntryPoint,
    pub(crate) nodes: Vec<NodeSnapshot>,
}

/// Serializable form of one node: its vector and per-layer links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeSnapshot {
    pub(crate) vector: Vec<f32>,
    pub(crate) links: Vec<Vec<NodeId>>,
}
