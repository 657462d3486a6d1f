//! HNSW search operations.

use super::super::layer::{GraphNode, NodeId};
use super::super::ordered_float::OrderedFloat;
use super::HnswGraph;
use crate::distance::DistanceEngine;
use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

impl<D: DistanceEngine> HnswGraph<D> {
    /// Searches for the k nearest neighbors, ascending by distance.
    ///
    /// The layer-0 beam holds `max(ef_search, k)` candidates. Once that
    /// covers every published node the beam would visit the whole graph
    /// anyway, so the search runs as an exact scan instead.
    pub(crate) fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(NodeId, f32)> {
        let len = self.len();
        if len == 0 || k == 0 {
            return Vec::new();
        }
        let ef = ef_search.max(k);
        if ef >= len {
            tracing::trace!(ef, len, "ef covers index, scanning exhaustively");
            return self.search_exact(query, k);
        }

        let Some((entry_node, top_level)) = *self.entry.read() else {
            return Vec::new();
        };

        let nodes = self.nodes.read();
        let mut current = entry_node;
        for layer in (1..=top_level).rev() {
            current = self.search_layer_single(&nodes, query, current, layer);
        }

        let mut candidates = self.search_layer(&nodes, query, &[current], ef, 0);
        candidates.truncate(k);
        candidates
    }

    /// Brute-force k nearest neighbors over all published nodes.
    pub(crate) fn search_exact(&self, query: &[f32], k: usize) -> Vec<(NodeId, f32)> {
        let nodes = self.nodes.read();
        let published = &nodes[..self.len().min(nodes.len())];
        let mut scored: Vec<(NodeId, f32)> = published
            .iter()
            .enumerate()
            .map(|(id, node)| (id, self.distance.distance(query, &node.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    // =========================================================================
    // Layer-level search helpers
    // =========================================================================

    /// Greedy walk on one layer, keeping a single closest candidate.
    pub(super) fn search_layer_single(
        &self,
        nodes: &[Arc<GraphNode>],
        query: &[f32],
        entry: NodeId,
        layer: usize,
    ) -> NodeId {
        let mut best = entry;
        let mut best_dist = self.distance.distance(query, &nodes[entry].vector);

        loop {
            let mut improved = false;
            for neighbor in nodes[best].neighbors(layer) {
                let dist = self.distance.distance(query, &nodes[neighbor].vector);
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }

        best
    }

    /// Beam search of a single layer with `ef` candidates.
    ///
    /// Returns up to `ef` nodes sorted by ascending distance.
    pub(super) fn search_layer(
        &self,
        nodes: &[Arc<GraphNode>],
        query: &[f32],
        entry_points: &[NodeId],
        ef: usize,
        layer: usize,
    ) -> Vec<(NodeId, f32)> {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat, NodeId)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrderedFloat, NodeId)> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = self.distance.distance(query, &nodes[ep].vector);
                candidates.push(Reverse((OrderedFloat(dist), ep)));
                results.push((OrderedFloat(dist), ep));
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(Reverse((OrderedFloat(c_dist), c_node))) = candidates.pop() {
            let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if c_dist > furthest && results.len() >= ef {
                break;
            }

            for neighbor in nodes[c_node].neighbors(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = self.distance.distance(query, &nodes[neighbor].vector);
                let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
                if dist < furthest || results.len() < ef {
                    candidates.push(Reverse((OrderedFloat(dist), neighbor)));
                    results.push((OrderedFloat(dist), neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<(NodeId, f32)> = results.into_iter().map(|(d, n)| (n, d.0)).collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }
}
