//! Fuzz target for persisted snapshot decoding.
//!
//! Index snapshots, fp32 models and int8 artifacts are read from disk;
//! malformed bytes must produce an error, never a panic.
//!
//! # Running
//!
//! ```bash
//! cd fuzz
//! cargo +nightly fuzz run fuzz_snapshot_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use lodestar_core::quantization::{EmbeddingModel, QuantizationArtifact, QuantizedModel};
use lodestar_core::HnswIndex;

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = HnswIndex::from_bytes(data) {
        if index.dimension() <= 4096 {
            let _ = index.search(&vec![0.5; index.dimension()], 3, 16);
        }
    }
    if let Ok(model) = EmbeddingModel::from_bytes(data) {
        if model.input_dim() <= 4096 {
            let _ = model.forward(&vec![0.5; model.input_dim()]);
        }
    }
    if let Ok(model) = QuantizedModel::from_bytes(data) {
        if model.input_dim() <= 4096 {
            let _ = model.forward(&vec![0.5; model.input_dim()]);
        }
    }
    let _ = QuantizationArtifact::from_bytes(data);
});
