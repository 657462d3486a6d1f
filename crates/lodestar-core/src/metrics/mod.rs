//! Retrieval quality and latency metrics.
//!
//! - **Retrieval quality**: Recall@k, Precision@k, MRR against brute-force ground truth
//! - **Latency statistics**: percentile computation (p50, p95, p99) over a rolling window
//!
//! # Example
//!
//! ```rust
//! use lodestar_core::metrics::{recall_at_k, precision_at_k};
//!
//! let ground_truth = vec!["a", "b", "c", "d"];
//! let results = vec!["a", "c", "x", "y"];
//!
//! assert!((recall_at_k(&ground_truth, &results) - 0.5).abs() < 1e-9);
//! assert!((precision_at_k(&ground_truth, &results) - 0.5).abs() < 1e-9);
//! ```

mod latency;
mod retrieval;

pub use latency::{compute_latency_percentiles, LatencyRecorder, LatencyStats};
pub use retrieval::{mrr, precision_at_k, recall_at_k};
