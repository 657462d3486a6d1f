//! HNSW neighbor selection and back-link management.

use super::super::layer::{GraphNode, NodeId};
use super::HnswGraph;
use crate::distance::DistanceEngine;
use std::sync::Arc;

impl<D: DistanceEngine> HnswGraph<D> {
    /// Heuristic neighbor selection with alpha diversification.
    ///
    /// `candidates` must be sorted by ascending distance to the new node. A
    /// candidate is kept when it is closer to the new node than to every
    /// neighbor already kept; remaining slots are filled with the closest
    /// rejected candidates.
    pub(super) fn select_neighbors(
        &self,
        nodes: &[Arc<GraphNode>],
        candidates: &[(NodeId, f32)],
        max_neighbors: usize,
    ) -> Vec<NodeId> {
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|&(id, _)| id).collect();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            let candidate_vec = &nodes[candidate].vector;
            let is_diverse = selected.iter().all(|&kept| {
                let dist_to_kept = self.distance.distance(candidate_vec, &nodes[kept].vector);
                self.alpha * candidate_dist <= dist_to_kept
            });
            if is_diverse {
                selected.push(candidate);
            }
        }

        if selected.len() < max_neighbors {
            for &(candidate, _) in candidates {
                if selected.len() >= max_neighbors {
                    break;
                }
                if !selected.contains(&candidate) {
                    selected.push(candidate);
                }
            }
        }

        selected
    }

    /// Links `neighbor -> new_node` on `layer`, pruning the neighbor's list
    /// back to capacity by dropping its farthest entries.
    ///
    /// The pruned entry may be `new_node` itself; links are symmetric by
    /// convention only.
    pub(super) fn add_back_link(
        &self,
        nodes: &[Arc<GraphNode>],
        neighbor: NodeId,
        new_node: NodeId,
        layer: usize,
    ) {
        let target = &nodes[neighbor];
        let mut links = target.neighbors(layer);
        if links.contains(&new_node) {
            return;
        }
        links.push(new_node);

        let max_links = self.params.max_links(layer);
        if links.len() > max_links {
            let base = target.vector.as_slice();
            let mut scored: Vec<(NodeId, f32)> = links
                .iter()
                .map(|&n| (n, self.distance.distance(base, &nodes[n].vector)))
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            scored.truncate(max_links);
            links = scored.into_iter().map(|(n, _)| n).collect();
        }

        target.set_neighbors(layer, links);
    }
}
