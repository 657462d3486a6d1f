//! Arena node storage and level assignment.

use parking_lot::RwLock;
use rand::{Rng, RngCore};

/// Index of a node in the graph arena.
pub(crate) type NodeId = usize;

/// Highest layer a node can be assigned to.
pub(crate) const MAX_LEVEL: usize = 15;

/// One arena slot: the vector plus one neighbor list per layer `0..=level`.
///
/// Each list sits behind its own lock and is only ever replaced wholesale,
/// so a reader sees either the old list or the new one.
pub(crate) struct GraphNode {
    pub(crate) vector: Vec<f32>,
    pub(crate) level: usize,
    links: Vec<RwLock<Vec<NodeId>>>,
}

impl GraphNode {
    pub(crate) fn new(vector: Vec<f32>, level: usize) -> Self {
        Self {
            vector,
            level,
            links: (0..=level).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    pub(crate) fn with_links(vector: Vec<f32>, links: Vec<Vec<NodeId>>) -> Self {
        let level = links.len().saturating_sub(1);
        Self {
            vector,
            level,
            links: links.into_iter().map(RwLock::new).collect(),
        }
    }

    /// Neighbors at `layer`; empty when the node does not reach that layer.
    pub(crate) fn neighbors(&self, layer: usize) -> Vec<NodeId> {
        self.links
            .get(layer)
            .map(|list| list.read().clone())
            .unwrap_or_default()
    }

    pub(crate) fn degree(&self, layer: usize) -> usize {
        self.links.get(layer).map_or(0, |list| list.read().len())
    }

    pub(crate) fn set_neighbors(&self, layer: usize, neighbors: Vec<NodeId>) {
        if let Some(list) = self.links.get(layer) {
            *list.write() = neighbors;
        }
    }

    pub(crate) fn all_links(&self) -> Vec<Vec<NodeId>> {
        self.links.iter().map(|list| list.read().clone()).collect()
    }
}

/// Draws node levels from `floor(-ln(u) * mL)`, `mL = 1 / ln(M)`.
pub(crate) struct LevelGenerator {
    rng: Box<dyn RngCore + Send>,
    level_mult: f64,
}

impl LevelGenerator {
    pub(crate) fn new(max_connections: usize, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            rng,
            level_mult: 1.0 / (max_connections as f64).ln(),
        }
    }

    // SAFETY: Layer selection uses an exponential distribution capped at MAX_LEVEL.
    // - cast_possible_truncation: floor() result is capped at 15, fitting in usize
    // - cast_sign_loss: -ln(u) is non-negative since u is in (0, 1]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn draw(&mut self) -> usize {
        // gen::<f64>() is in [0, 1); flip it so ln() never sees zero.
        let uniform = 1.0 - self.rng.gen::<f64>();
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_level_distribution_decays() {
        let mut gen = LevelGenerator::new(16, Box::new(StdRng::seed_from_u64(7)));
        let mut histogram = [0_usize; MAX_LEVEL + 1];
        for _ in 0..10_000 {
            histogram[gen.draw()] += 1;
        }
        // P(level >= 1) = 1/M, so roughly 94% of nodes stay on layer 0.
        assert!(histogram[0] > 9_000, "layer 0 count {}", histogram[0]);
        assert!(histogram[1] > histogram[2]);
        assert!(histogram[1] > 300 && histogram[1] < 900);
    }

    #[test]
    fn test_level_generator_is_seedable() {
        let mut a = LevelGenerator::new(8, Box::new(StdRng::seed_from_u64(42)));
        let mut b = LevelGenerator::new(8, Box::new(StdRng::seed_from_u64(42)));
        let left: Vec<usize> = (0..256).map(|_| a.draw()).collect();
        let right: Vec<usize> = (0..256).map(|_| b.draw()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_node_links_are_bounded_by_level() {
        let node = GraphNode::new(vec![0.0; 4], 2);
        node.set_neighbors(1, vec![3, 4]);
        node.set_neighbors(5, vec![9]);
        assert_eq!(node.neighbors(1), vec![3, 4]);
        assert!(node.neighbors(5).is_empty());
        assert_eq!(node.degree(1), 2);
        assert_eq!(node.all_links().len(), 3);
    }
}
