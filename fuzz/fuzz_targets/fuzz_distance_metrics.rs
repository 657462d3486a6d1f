//! Fuzz target for distance metrics and weight quantization.
//!
//! Arbitrary vectors (NaN, infinities, denormals) must never panic.
//!
//! # Running
//!
//! ```bash
//! cd fuzz
//! cargo +nightly fuzz run fuzz_distance_metrics
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lodestar_core::distance::{cosine_similarity, l2_normalize};
use lodestar_core::quantization::{ActivationParams, Granularity, QuantizedTensor};
use lodestar_core::DistanceMetric;

#[derive(Arbitrary, Debug)]
struct DistanceInput {
    vec_a: Vec<f32>,
    /// Truncated or zero-padded to the length of `vec_a`.
    vec_b: Vec<f32>,
    per_tensor: bool,
}

fuzz_target!(|input: DistanceInput| {
    if input.vec_a.is_empty() {
        return;
    }

    // Limit vector size to prevent OOM
    let dim = input.vec_a.len().min(2048);
    let a: Vec<f32> = input.vec_a.into_iter().take(dim).collect();
    let mut b: Vec<f32> = input.vec_b.into_iter().take(dim).collect();
    b.resize(dim, 0.0);

    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::InnerProduct,
        DistanceMetric::L2,
    ] {
        let _ = metric.score(metric.distance(&a, &b));
    }
    let _ = cosine_similarity(&a, &b);
    let mut normalized = a.clone();
    l2_normalize(&mut normalized);

    let granularity = if input.per_tensor {
        Granularity::PerTensor
    } else {
        Granularity::PerChannel
    };
    if let Ok(tensor) = QuantizedTensor::quantize(&a, 1, dim, granularity) {
        let _ = tensor.dequantize();
    }
    let params = ActivationParams::from_range(b[0], b[dim - 1]);
    let _ = params.dequantize(params.quantize(a[0]));
});
