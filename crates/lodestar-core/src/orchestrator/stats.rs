//! Query counters and latency percentiles.

use super::types::{QueryResponse, QueryStatus};
use crate::metrics::{LatencyRecorder, LatencyStats};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of orchestrator activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// Queries answered (any status).
    pub total_queries: u64,
    /// Queries with [`QueryStatus::Success`].
    pub success_count: u64,
    /// Degraded responses (timeout or fp32 fallback).
    pub fallback_count: u64,
    /// Queries that hit their deadline.
    pub timeout_count: u64,
    /// Queries with [`QueryStatus::Error`].
    pub error_count: u64,
    /// Latency over the recent window.
    #[serde(skip)]
    pub latency: LatencyStats,
}

#[derive(Debug, Default)]
pub(super) struct QueryCounters {
    total: AtomicU64,
    success: AtomicU64,
    fallback: AtomicU64,
    timeout: AtomicU64,
    error: AtomicU64,
    latency: LatencyRecorder,
}

impl QueryCounters {
    pub(super) fn record(&self, response: &QueryResponse) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if response.fallback {
            self.fallback.fetch_add(1, Ordering::Relaxed);
        }
        let counter = match response.status {
            QueryStatus::Success => Some(&self.success),
            QueryStatus::Timeout => Some(&self.timeout),
            QueryStatus::Error => Some(&self.error),
            QueryStatus::Fallback => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.latency.record(response.latency);
    }

    pub(super) fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            total_queries: self.total.load(Ordering::Relaxed),
            success_count: self.success.load(Ordering::Relaxed),
            fallback_count: self.fallback.load(Ordering::Relaxed),
            timeout_count: self.timeout.load(Ordering::Relaxed),
            error_count: self.error.load(Ordering::Relaxed),
            latency: self.latency.stats(),
        }
    }
}
