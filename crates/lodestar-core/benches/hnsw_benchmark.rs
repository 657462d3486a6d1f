//! HNSW index benchmarks.
//!
//! Measures:
//! - Insert throughput
//! - Search latency across `ef_search` values
//! - Exact scan for comparison

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lodestar_core::distance::l2_normalize;
use lodestar_core::{DistanceMetric, HnswIndex, HnswParams, IndexedItem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 128;
const CORPUS: usize = 5_000;

fn unit_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
            l2_normalize(&mut v);
            v
        })
        .collect()
}

fn build(vectors: &[Vec<f32>]) -> HnswIndex {
    let index = HnswIndex::with_params(DIM, DistanceMetric::Cosine, HnswParams::auto(DIM))
        .expect("valid params");
    for (i, v) in vectors.iter().enumerate() {
        index
            .insert(IndexedItem::new(format!("doc-{i}"), v.clone()))
            .expect("insert");
    }
    index
}

// =============================================================================
// Construction
// =============================================================================

fn bench_insert(c: &mut Criterion) {
    let vectors = unit_vectors(1_000, 1);
    let mut group = c.benchmark_group("hnsw_insert");
    group.sample_size(10);
    group.throughput(Throughput::Elements(vectors.len() as u64));
    group.bench_function("1k_dim128", |b| {
        b.iter(|| black_box(build(&vectors)));
    });
    group.finish();
}

// =============================================================================
// Search
// =============================================================================

fn bench_search(c: &mut Criterion) {
    let index = build(&unit_vectors(CORPUS, 2));
    let queries = unit_vectors(64, 3);

    let mut group = c.benchmark_group("hnsw_search_k10");
    for ef in [16, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(ef), &ef, |b, &ef| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % queries.len();
                black_box(index.search(&queries[i], 10, ef))
            });
        });
    }
    group.bench_function("exact", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % queries.len();
            black_box(index.search_exact(&queries[i], 10))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
