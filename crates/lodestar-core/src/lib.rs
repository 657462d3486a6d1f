//! # Lodestar Core
//!
//! Offline semantic retrieval for embedded and edge deployments.
//!
//! Lodestar answers short text queries with the most similar items of a local
//! corpus, without any network access. It is built from three parts:
//!
//! ## Features
//!
//! - **HNSW index**: approximate nearest-neighbor search over an arena graph,
//!   with concurrent reads, a single writer and checksummed persistence
//! - **Int8 quantization**: calibrated int8 embedding models with held-out
//!   accuracy validation, block-wise quantization under a memory budget and
//!   automatic fp32 fallback
//! - **Query orchestration**: embed, search, filter and attach metadata under
//!   a soft deadline, with degraded responses instead of errors
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use lodestar_core::config::{QuantizationConfig, QueryConfig};
//! use lodestar_core::quantization::{EmbeddingModel, QuantizationEngine};
//! use lodestar_core::{DistanceMetric, HnswIndex, IndexedItem, QueryOrchestrator, QueryRequest};
//!
//! fn main() -> lodestar_core::Result<()> {
//!     let engine = Arc::new(QuantizationEngine::new(QuantizationConfig::default())?);
//!     engine.initialize(QuantizationConfig::default(), EmbeddingModel::random_projection(256, 64, 42)?)?;
//!
//!     let index = Arc::new(HnswIndex::new(64, DistanceMetric::Cosine)?);
//!     for (id, text) in [("doc-1", "replace the battery"), ("doc-2", "reset to factory settings")] {
//!         let embedding = engine.embed(text)?;
//!         index.insert(IndexedItem::new(id, embedding.vector).with_metadata("text", text))?;
//!     }
//!
//!     let orchestrator = QueryOrchestrator::new(engine, index, QueryConfig::default())?;
//!     let response = orchestrator.query(QueryRequest::new("replace the battery"));
//!     assert_eq!(response.results[0].id, "doc-1");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::doc_markdown,
        clippy::uninlined_format_args,
        clippy::float_cmp,
        clippy::cast_lossless,
        clippy::manual_assert
    )
)]

pub mod config;
#[cfg(test)]
mod config_tests;
pub mod distance;
pub mod error;
pub mod index;
pub mod item;
pub mod metrics;
pub mod orchestrator;
pub mod quantization;

pub use config::{IndexConfig, LodestarConfig, LoggingConfig, QuantizationConfig, QueryConfig, TilingConfig};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::{HnswIndex, HnswParams, IndexStats, SearchQuality, VectorIndex};
pub use item::{IndexedItem, Metadata, MetadataValue};
pub use metrics::{compute_latency_percentiles, recall_at_k, LatencyStats};
pub use orchestrator::{
    Embedder, OrchestratorStats, QueryFallbackReason, QueryOrchestrator, QueryRequest,
    QueryResponse, QueryResult, QueryStatus,
};
pub use quantization::{
    EmbeddingModel, EngineStatus, FallbackReason, ModelMode, QuantizationEngine,
    QuantizationResult, QuantizedModel,
};
