//! Query orchestration: embed, search, filter, under a soft deadline.
//!
//! Each query runs on a bounded worker pool while the caller waits on a
//! one-slot channel with a deadline. A query that misses its deadline is
//! answered immediately with [`QueryStatus::Timeout`]; the worker finishes in
//! the background and its late result is dropped.

mod stats;
mod types;


pub use stats::OrchestratorStats;
pub use types::{QueryFallbackReason, QueryRequest, QueryResponse, QueryResult, QueryStatus};

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::quantization::{Embedding, ModelMode, QuantizationEngine};
use crossbeam_channel::RecvTimeoutError;
use rayon::ThreadPool;
use stats::QueryCounters;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Turns query text into an embedding.
pub trait Embedder: Send + Sync {
    /// Embeds `text`, reporting which model produced the vector.
    fn embed(&self, text: &str) -> Result<Embedding>;
}

impl Embedder for QuantizationEngine {
    fn embed(&self, text: &str) -> Result<Embedding> {
        QuantizationEngine::embed(self, text)
    }
}

/// Results of a finished worker, before deadline bookkeeping.
struct SearchOutcome {
    results: Vec<QueryResult>,
    embedding_mode: ModelMode,
    degraded: bool,
}

/// Coordinates the embedder and the index for text queries.
pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: QueryConfig,
    pool: ThreadPool,
    counters: QueryCounters,
}

impl fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("config", &self.config)
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl QueryOrchestrator {
    /// Creates an orchestrator with `config.worker_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid configuration and
    /// [`Error::ThreadPool`] if the workers cannot be spawned.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: QueryConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|idx| format!("lodestar-query-{idx}"))
            .panic_handler(|_| tracing::error!("query worker panicked"))
            .build()?;
        Ok(Self {
            embedder,
            index,
            config,
            pool,
            counters: QueryCounters::default(),
        })
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Runs a query. Never fails: every problem is reported through the
    /// response status.
    pub fn query(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let query_id = Uuid::new_v4();
        let top_k = request
            .top_k
            .unwrap_or(self.config.default_top_k)
            .clamp(1, self.config.max_top_k);
        let threshold = request.threshold.unwrap_or(self.config.default_threshold);
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());

        let response = if request.text.trim().is_empty() {
            not_ready(query_id, started, "query text is empty".to_string())
        } else if self.index.is_empty() {
            not_ready(query_id, started, "index is empty".to_string())
        } else {
            self.dispatch(query_id, started, request.text, top_k, threshold, timeout)
        };

        match response.status {
            QueryStatus::Success | QueryStatus::Fallback => tracing::debug!(
                %query_id,
                status = %response.status,
                results = response.results.len(),
                latency_us = response.latency.as_micros(),
                "query answered"
            ),
            QueryStatus::Timeout => tracing::warn!(
                %query_id,
                timeout_ms = timeout.as_millis(),
                "query timed out"
            ),
            QueryStatus::Error => tracing::warn!(
                %query_id,
                error = response.error.as_deref().unwrap_or_default(),
                "query failed"
            ),
        }
        self.counters.record(&response);
        response
    }

    fn dispatch(
        &self,
        query_id: Uuid,
        started: Instant,
        text: String,
        top_k: usize,
        threshold: f32,
        timeout: Duration,
    ) -> QueryResponse {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let embedder = Arc::clone(&self.embedder);
        let index = Arc::clone(&self.index);
        let ef_search = self.config.ef_search.max(top_k);

        self.pool.spawn(move || {
            let outcome = search(&*embedder, &*index, &text, top_k, threshold, ef_search);
            // The receiver is gone once the deadline passed.
            let _ = tx.send(outcome);
        });

        let deadline = timeout.saturating_sub(started.elapsed());
        match rx.recv_timeout(deadline) {
            Ok(Ok(outcome)) => {
                let reason = outcome.degraded.then_some(QueryFallbackReason::Fp32Model);
                QueryResponse {
                    query_id,
                    results: outcome.results,
                    latency: started.elapsed(),
                    fallback: outcome.degraded,
                    status: if outcome.degraded {
                        QueryStatus::Fallback
                    } else {
                        QueryStatus::Success
                    },
                    fallback_reason: reason,
                    model_mode: Some(outcome.embedding_mode),
                    error: None,
                }
            }
            Ok(Err(err)) => {
                let reason = matches!(err, Error::UninitializedModel)
                    .then_some(QueryFallbackReason::NotReady);
                QueryResponse {
                    fallback_reason: reason,
                    ..error_response(query_id, started, err.to_string())
                }
            }
            Err(RecvTimeoutError::Timeout) => QueryResponse {
                query_id,
                results: Vec::new(),
                latency: started.elapsed(),
                fallback: true,
                status: QueryStatus::Timeout,
                fallback_reason: Some(QueryFallbackReason::Timeout),
                model_mode: None,
                error: Some(Error::QueryTimeout(timeout).to_string()),
            },
            Err(RecvTimeoutError::Disconnected) => {
                error_response(query_id, started, "query worker stopped unexpectedly".to_string())
            }
        }
    }

    /// Query counters and latency percentiles.
    #[must_use]
    pub fn stats(&self) -> OrchestratorStats {
        self.counters.snapshot()
    }
}

fn search(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    text: &str,
    top_k: usize,
    threshold: f32,
    ef_search: usize,
) -> Result<SearchOutcome> {
    let embedding = embedder.embed(text)?;
    let metric = index.metric();
    let results = index
        .search(&embedding.vector, top_k, ef_search)?
        .into_iter()
        .map(|(id, distance, metadata)| QueryResult {
            id,
            score: metric.score(distance),
            metadata,
        })
        .filter(|result| result.score >= threshold)
        .take(top_k)
        .collect();
    Ok(SearchOutcome {
        results,
        embedding_mode: embedding.mode,
        degraded: embedding.mode == ModelMode::Fp32 && embedding.fallback.is_some(),
    })
}

fn error_response(query_id: Uuid, started: Instant, error: String) -> QueryResponse {
    QueryResponse {
        query_id,
        results: Vec::new(),
        latency: started.elapsed(),
        fallback: false,
        status: QueryStatus::Error,
        fallback_reason: None,
        model_mode: None,
        error: Some(error),
    }
}

fn not_ready(query_id: Uuid, started: Instant, error: String) -> QueryResponse {
    QueryResponse {
        fallback_reason: Some(QueryFallbackReason::NotReady),
        ..error_response(query_id, started, error)
    }
}
