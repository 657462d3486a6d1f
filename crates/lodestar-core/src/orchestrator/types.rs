//! Query request and response types.

use crate::item::{metadata_to_json, Metadata};
use crate::quantization::ModelMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A semantic query.
///
/// Unset fields take the orchestrator's configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Query text.
    pub text: String,
    /// Maximum number of results (capped by `max_top_k`).
    pub top_k: Option<usize>,
    /// Minimum similarity score of a result.
    pub threshold: Option<f32>,
    /// Deadline for the whole query.
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    /// Request for `text` with configured defaults.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: None,
            threshold: None,
            timeout: None,
        }
    }

    /// Sets the number of results.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets the minimum similarity score.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One retrieved item.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Item id.
    pub id: String,
    /// Similarity score (higher is closer).
    pub score: f32,
    /// Item metadata.
    pub metadata: Metadata,
}

/// Overall outcome of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Answered by the preferred model within the deadline.
    Success,
    /// The deadline passed; results were discarded.
    Timeout,
    /// Answered by the fp32 model after a quantization fallback.
    Fallback,
    /// No answer could be produced.
    Error,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Fallback => "fallback",
            Self::Error => "error",
        })
    }
}

/// Why a response is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFallbackReason {
    /// The deadline passed.
    Timeout,
    /// The embedding came from the fp32 model.
    Fp32Model,
    /// No model or no indexed items.
    NotReady,
}

/// Answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Unique id of this query.
    pub query_id: Uuid,
    /// Results ordered by descending score.
    pub results: Vec<QueryResult>,
    /// Time until the response was produced.
    pub latency: Duration,
    /// True if the response is degraded (timeout or fp32 fallback).
    pub fallback: bool,
    /// Outcome.
    pub status: QueryStatus,
    /// Why the response is degraded, if it is.
    pub fallback_reason: Option<QueryFallbackReason>,
    /// Model that embedded the query, when embedding finished in time.
    pub model_mode: Option<ModelMode>,
    /// Error description for [`QueryStatus::Error`] and [`QueryStatus::Timeout`].
    pub error: Option<String>,
}

impl QueryResponse {
    /// True for [`QueryStatus::Success`] and [`QueryStatus::Fallback`].
    #[must_use]
    pub fn is_answered(&self) -> bool {
        matches!(self.status, QueryStatus::Success | QueryStatus::Fallback)
    }

    /// Renders the response as JSON with plain metadata values.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let results: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "score": r.score,
                    "metadata": metadata_to_json(&r.metadata),
                })
            })
            .collect();
        serde_json::json!({
            "query_id": self.query_id.to_string(),
            "results": results,
            "latency_ms": self.latency.as_secs_f64() * 1000.0,
            "fallback": self.fallback,
            "status": self.status,
            "fallback_reason": self.fallback_reason,
            "model_mode": self.model_mode,
            "error": self.error,
        })
    }
}
