//! Tests for the HNSW graph and index.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]

use super::*;
use crate::distance::DistanceMetric;
use crate::error::Error;
use crate::item::{IndexedItem, MetadataValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn build_index(vectors: &[Vec<f32>], params: HnswParams) -> HnswIndex {
    let index = HnswIndex::with_params(vectors[0].len(), DistanceMetric::Cosine, params).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index
            .insert(IndexedItem::new(format!("doc-{i}"), v.clone()))
            .unwrap();
    }
    index
}

#[test]
fn test_empty_index_search_returns_empty() {
    let index = HnswIndex::new(8, DistanceMetric::Cosine).unwrap();
    assert!(index.is_empty());
    assert!(index.search(&[0.1; 8], 5, 64).unwrap().is_empty());
    assert!(index.search_exact(&[0.1; 8], 5).unwrap().is_empty());
}

#[test]
fn test_single_item_is_found() {
    let index = HnswIndex::new(3, DistanceMetric::Cosine).unwrap();
    index
        .insert(IndexedItem::new("only", vec![1.0, 0.0, 0.0]))
        .unwrap();
    let hits = index.search(&[1.0, 0.0, 0.0], 3, 16).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "only");
    assert!(hits[0].1.abs() < 1e-6);
}

#[test]
fn test_duplicate_id_is_rejected_and_size_unchanged() {
    let index = HnswIndex::new(4, DistanceMetric::Cosine).unwrap();
    index
        .insert(IndexedItem::new("a", vec![1.0, 0.0, 0.0, 0.0]))
        .unwrap();
    let err = index
        .insert(IndexedItem::new("a", vec![0.0, 1.0, 0.0, 0.0]))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateId(ref id) if id == "a"));
    assert_eq!(index.len(), 1);
    let (vector, _) = index.get("a").unwrap();
    assert_eq!(vector, vec![1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_dimension_mismatch() {
    let index = HnswIndex::new(4, DistanceMetric::Cosine).unwrap();
    let err = index.insert(IndexedItem::new("a", vec![1.0; 3])).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 4,
            actual: 3
        }
    ));
    assert!(index.search(&[1.0; 5], 1, 10).is_err());
}

#[test]
fn test_non_finite_vector_rejected() {
    let index = HnswIndex::new(2, DistanceMetric::L2).unwrap();
    assert!(index
        .insert(IndexedItem::new("nan", vec![f32::NAN, 0.0]))
        .is_err());
    assert!(index.is_empty());
}

#[test]
fn test_capacity_exceeded() {
    let params = HnswParams::custom(4, 16, 16, 3);
    let index = HnswIndex::with_params(2, DistanceMetric::L2, params).unwrap();
    for i in 0..3 {
        index
            .insert(IndexedItem::new(format!("p{i}"), vec![i as f32, 1.0]))
            .unwrap();
    }
    let err = index
        .insert(IndexedItem::new("p3", vec![3.0, 1.0]))
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(3)));
    assert_eq!(index.len(), 3);
}

#[test]
fn test_invalid_construction_rejected() {
    assert!(HnswIndex::new(0, DistanceMetric::Cosine).is_err());
    let bad = HnswParams::custom(1, 10, 10, 10);
    assert!(HnswIndex::with_params(4, DistanceMetric::Cosine, bad).is_err());
}

#[test]
fn test_metadata_round_trip() {
    let index = HnswIndex::new(2, DistanceMetric::Cosine).unwrap();
    index
        .insert(
            IndexedItem::new("doc", vec![0.3, 0.7])
                .with_metadata("title", "Guide")
                .with_metadata("page", 12_i64),
        )
        .unwrap();
    let metadata = index.metadata("doc").unwrap();
    assert_eq!(
        metadata.get("title"),
        Some(&crate::item::MetadataValue::String("Guide".into()))
    );
    assert!(index.metadata("missing").is_none());
    assert!(index.contains("doc"));
    assert!(!index.contains("missing"));
}

#[test]
fn test_results_sorted_and_bounded_by_k() {
    let vectors = random_vectors(500, 16, 3);
    let index = build_index(&vectors, HnswParams::custom(8, 64, 32, 1_000));
    let hits = index.search(&vectors[10], 10, 64).unwrap();
    assert_eq!(hits.len(), 10);
    assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(hits[0].0, "doc-10");
}

#[test]
fn test_neighbor_lists_respect_capacity() {
    let vectors = random_vectors(400, 8, 11);
    let params = HnswParams::custom(4, 32, 32, 1_000);
    let index = build_index(&vectors, params);
    let snapshot = index.graph.snapshot();
    for node in &snapshot.nodes {
        for (layer, links) in node.links.iter().enumerate() {
            assert!(
                links.len() <= params.max_links(layer),
                "layer {layer} has {} links",
                links.len()
            );
        }
    }
}

#[test]
fn test_entry_point_has_highest_level() {
    let vectors = random_vectors(300, 8, 5);
    let index = build_index(&vectors, HnswParams::custom(4, 32, 32, 1_000));
    let snapshot = index.graph.snapshot();
    let (entry, level) = snapshot.entry.unwrap();
    let top = snapshot.nodes.iter().map(|n| n.links.len() - 1).max().unwrap();
    assert_eq!(level, top);
    // Ties resolve to the first node that reached the top level.
    let first_at_top = snapshot
        .nodes
        .iter()
        .position(|n| n.links.len() - 1 == top)
        .unwrap();
    assert_eq!(entry, first_at_top);
}

#[test]
fn test_same_seed_builds_same_graph() {
    let vectors = random_vectors(200, 8, 9);
    let params = HnswParams::custom(6, 40, 32, 1_000);
    let a = build_index(&vectors, params);
    let b = build_index(&vectors, params);
    assert_eq!(a.graph.snapshot(), b.graph.snapshot());
}

#[test]
fn test_injected_rng_drives_levels() {
    let params = HnswParams::custom(4, 16, 16, 1_000);
    let index =
        HnswIndex::with_rng(4, DistanceMetric::L2, params, StdRng::seed_from_u64(1)).unwrap();
    for i in 0..50 {
        index
            .insert(IndexedItem::new(format!("n{i}"), vec![i as f32, 0.0, 0.0, 1.0]))
            .unwrap();
    }
    let stats = index.stats();
    assert_eq!(stats.len, 50);
    assert_eq!(stats.layer_sizes[0], 50);
    assert_eq!(stats.layer_sizes.len(), stats.max_layer + 1);
}

#[test]
fn test_stats() {
    let vectors = random_vectors(120, 16, 21);
    let index = build_index(&vectors, HnswParams::custom(8, 32, 32, 1_000));
    let stats = index.stats();
    assert_eq!(stats.len, 120);
    assert_eq!(stats.dimension, 16);
    assert!(stats.entry_point.is_some());
    assert!(stats.avg_degree_layer0 > 1.0);
    assert!(stats.estimated_memory_bytes >= 120 * 16 * 4);
}

#[test]
fn test_snapshot_round_trip_preserves_search() {
    let vectors = random_vectors(300, 12, 17);
    let index = build_index(&vectors, HnswParams::custom(8, 48, 24, 1_000));
    let bytes = index.to_bytes().unwrap();
    let restored = HnswIndex::from_bytes(&bytes).unwrap();

    assert_eq!(restored.len(), index.len());
    for query in vectors.iter().step_by(25) {
        assert_eq!(
            index.search(query, 5, 24).unwrap(),
            restored.search(query, 5, 24).unwrap()
        );
    }
    // Ids remain unique after reload.
    assert!(matches!(
        restored.insert(IndexedItem::new("doc-0", vectors[0].clone())),
        Err(Error::DuplicateId(_))
    ));
}

#[test]
fn test_save_and_load_directory() {
    let dir = tempfile::tempdir().unwrap();
    let vectors = random_vectors(100, 8, 4);
    let index = build_index(&vectors, HnswParams::custom(6, 32, 16, 1_000));
    index.save(dir.path()).unwrap();

    let meta = load_meta(dir.path()).unwrap();
    assert_eq!(meta.len, 100);
    assert_eq!(meta.dimension, 8);
    assert_eq!(meta.format_version, FORMAT_VERSION);

    let loaded = HnswIndex::load(dir.path()).unwrap();
    assert_eq!(
        loaded.search(&vectors[7], 3, 16).unwrap(),
        index.search(&vectors[7], 3, 16).unwrap()
    );
}

#[test]
fn test_load_detects_tampered_graph() {
    let dir = tempfile::tempdir().unwrap();
    let vectors = random_vectors(20, 4, 8);
    build_index(&vectors, HnswParams::custom(4, 16, 16, 100))
        .save(dir.path())
        .unwrap();

    let graph_path = dir.path().join("hnsw_graph.bin");
    let mut bytes = std::fs::read(&graph_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&graph_path, bytes).unwrap();

    assert!(matches!(
        HnswIndex::load(dir.path()),
        Err(Error::Corrupted(_))
    ));
}

#[test]
fn test_from_bytes_rejects_garbage() {
    assert!(HnswIndex::from_bytes(&[1, 2, 3]).is_err());
}

#[test]
fn test_concurrent_insert_search_no_deadlock() {
    let vectors = random_vectors(400, 16, 33);
    let index = Arc::new(build_index(&vectors[..100], HnswParams::custom(8, 48, 32, 1_000)));

    let mut handles = Vec::new();
    let writer_index = Arc::clone(&index);
    let to_insert = vectors[100..].to_vec();
    handles.push(thread::spawn(move || {
        for (i, v) in to_insert.into_iter().enumerate() {
            writer_index
                .insert(IndexedItem::new(format!("late-{i}"), v).with_metadata("seq", i as i64))
                .unwrap();
        }
    }));

    for t in 0..4 {
        let reader_index = Arc::clone(&index);
        let queries = vectors[t * 20..t * 20 + 20].to_vec();
        handles.push(thread::spawn(move || {
            for q in queries {
                let hits = reader_index.search_with_metadata(&q, 5, 32).unwrap();
                assert!(!hits.is_empty());
                // Hits on items still being inserted carry their metadata too.
                for (id, _, metadata) in &hits {
                    if let Some(seq) = id.strip_prefix("late-") {
                        let expected = seq.parse::<i64>().unwrap();
                        assert_eq!(metadata.get("seq"), Some(&MetadataValue::from(expected)));
                    }
                }
            }
        }));
    }

    for handle in handles {
        assert!(handle.join().is_ok(), "thread should complete without panic");
    }
    assert_eq!(index.len(), 400);
}

#[test]
fn test_search_carries_metadata_before_insert_returns() {
    let index = HnswIndex::new(3, DistanceMetric::Cosine).unwrap();
    index
        .insert(IndexedItem::new("a", vec![1.0, 0.0, 0.0]).with_metadata("title", "first"))
        .unwrap();
    index
        .insert(IndexedItem::new("b", vec![0.0, 1.0, 0.0]).with_metadata("title", "second"))
        .unwrap();

    // State between graph publication and id registration.
    index.ids.write().remove("b");
    assert!(index.metadata("b").is_none());

    let hits = index.search_with_metadata(&[0.0, 1.0, 0.0], 1, 16).unwrap();
    assert_eq!(hits[0].0, "b");
    assert_eq!(hits[0].2.get("title"), Some(&MetadataValue::from("second")));
}

#[test]
fn test_inner_product_metric_search() {
    let index = HnswIndex::new(2, DistanceMetric::InnerProduct).unwrap();
    index.insert(IndexedItem::new("small", vec![0.1, 0.1])).unwrap();
    index.insert(IndexedItem::new("large", vec![5.0, 5.0])).unwrap();
    let hits = index.search(&[1.0, 1.0], 1, 8).unwrap();
    assert_eq!(hits[0].0, "large");
    assert!((hits[0].1 + 10.0).abs() < 1e-5);
}
