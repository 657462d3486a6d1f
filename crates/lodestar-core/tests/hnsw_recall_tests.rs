//! Recall and exactness tests for the HNSW index against brute force.
#![allow(clippy::cast_precision_loss)]

use lodestar_core::distance::l2_normalize;
use lodestar_core::metrics::recall_at_k;
use lodestar_core::{DistanceMetric, HnswIndex, HnswParams, IndexedItem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn unit_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            l2_normalize(&mut v);
            v
        })
        .collect()
}

fn build(vectors: &[Vec<f32>], params: HnswParams) -> HnswIndex {
    let index = HnswIndex::with_params(vectors[0].len(), DistanceMetric::Cosine, params)
        .expect("valid params");
    for (i, v) in vectors.iter().enumerate() {
        index
            .insert(IndexedItem::new(format!("doc-{i}"), v.clone()))
            .expect("insert");
    }
    index
}

fn ids(hits: &[(String, f32)]) -> Vec<String> {
    hits.iter().map(|(id, _)| id.clone()).collect()
}

#[test]
fn test_full_beam_matches_brute_force() {
    let vectors = unit_vectors(600, 24, 1);
    let index = build(&vectors, HnswParams::custom(6, 32, 16, 1_000));
    let queries = unit_vectors(20, 24, 2);

    for query in &queries {
        let approx = index.search(query, 10, index.len()).unwrap();
        let exact = index.search_exact(query, 10).unwrap();
        assert_eq!(ids(&approx), ids(&exact));
    }
}

#[test]
fn test_recall_improves_with_beam_width() {
    let vectors = unit_vectors(2_000, 32, 3);
    let index = build(&vectors, HnswParams::custom(8, 64, 16, 4_000));
    let queries = unit_vectors(50, 32, 4);
    let k = 10;

    let mean_recall = |ef: usize| {
        let total: f64 = queries
            .iter()
            .map(|q| {
                let truth = ids(&index.search_exact(q, k).unwrap());
                let found = ids(&index.search(q, k, ef).unwrap());
                recall_at_k(&truth, &found)
            })
            .sum();
        total / queries.len() as f64
    };

    let narrow = mean_recall(k);
    let wide = mean_recall(128);
    let full = mean_recall(index.len());
    assert!(narrow <= wide + 1e-9, "recall {narrow} at ef=k vs {wide} at ef=128");
    assert!(wide <= full + 1e-9);
    assert!((full - 1.0).abs() < 1e-9);
    assert!(wide > 0.9, "recall at ef=128 too low: {wide}");
}

#[test]
fn test_exact_copy_found_among_ten_thousand() {
    let vectors = unit_vectors(10_000, 128, 42);
    let index = build(&vectors, HnswParams::custom(16, 200, 64, 20_000));
    assert_eq!(index.len(), 10_000);

    let hits = index.search(&vectors[42], 1, 64).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "doc-42");
    assert!(hits[0].1.abs() < 1e-5, "distance {}", hits[0].1);
}

#[test]
fn test_reloaded_index_answers_identically() {
    let dir = tempfile::tempdir().unwrap();
    let vectors = unit_vectors(500, 16, 7);
    let index = build(&vectors, HnswParams::custom(8, 48, 32, 1_000));
    index.save(dir.path()).unwrap();

    let loaded = HnswIndex::load(dir.path()).unwrap();
    assert_eq!(loaded.len(), 500);
    assert_eq!(loaded.metric(), DistanceMetric::Cosine);
    for query in unit_vectors(10, 16, 8) {
        assert_eq!(
            loaded.search(&query, 5, 32).unwrap(),
            index.search(&query, 5, 32).unwrap()
        );
    }
}
