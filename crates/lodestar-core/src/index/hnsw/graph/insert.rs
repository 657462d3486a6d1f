//! HNSW insert operations.

use super::super::layer::{GraphNode, NodeId};
use super::HnswGraph;
use crate::distance::DistanceEngine;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl<D: DistanceEngine> HnswGraph<D> {
    /// Inserts a vector and returns its node id.
    ///
    /// Neighbor lists are planned top-down, then published bottom-up: a node
    /// reachable on layer `l` already has its lists for layers `0..=l` set.
    pub(crate) fn insert(&self, vector: Vec<f32>) -> NodeId {
        let mut levels = self.levels.lock();
        let level = levels.draw();

        let node_id = {
            let mut nodes = self.nodes.write();
            nodes.push(Arc::new(GraphNode::new(vector, level)));
            nodes.len() - 1
        };

        let entry = *self.entry.read();
        let Some((entry_node, top_level)) = entry else {
            *self.entry.write() = Some((node_id, level));
            self.count.fetch_add(1, Ordering::Release);
            return node_id;
        };

        let nodes = self.nodes.read();
        let query = nodes[node_id].vector.as_slice();

        let mut current = entry_node;
        for layer in (level + 1..=top_level).rev() {
            current = self.search_layer_single(&nodes, query, current, layer);
        }

        let mut plan: Vec<(usize, Vec<NodeId>)> = Vec::with_capacity(level.min(top_level) + 1);
        let mut entry_points = vec![current];
        for layer in (0..=level.min(top_level)).rev() {
            let candidates =
                self.search_layer(&nodes, query, &entry_points, self.params.ef_construction, layer);
            let selected = self.select_neighbors(&nodes, &candidates, self.params.max_links(layer));
            entry_points = candidates.iter().map(|&(id, _)| id).collect();
            plan.push((layer, selected));
        }

        for (layer, selected) in plan.into_iter().rev() {
            nodes[node_id].set_neighbors(layer, selected.clone());
            for neighbor in selected {
                self.add_back_link(&nodes, neighbor, node_id, layer);
            }
        }
        drop(nodes);

        if level > top_level {
            *self.entry.write() = Some((node_id, level));
            tracing::debug!(node = node_id, level, "hnsw entry point promoted");
        }
        self.count.fetch_add(1, Ordering::Release);
        node_id
    }
}
