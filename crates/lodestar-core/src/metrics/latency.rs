//! Latency measurement and percentile statistics.
//!
//! Provides tools for computing latency percentiles (p50, p95, p99)
//! from duration samples, plus a bounded recorder for live services.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Statistics for latency measurements including percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyStats {
    /// Number of samples the statistics were computed from
    pub count: usize,
    /// Minimum latency observed
    pub min: Duration,
    /// Maximum latency observed
    pub max: Duration,
    /// Mean (average) latency
    pub mean: Duration,
    /// 50th percentile (median)
    pub p50: Duration,
    /// 95th percentile
    pub p95: Duration,
    /// 99th percentile
    pub p99: Duration,
}

/// Computes latency percentiles from a list of duration samples.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use lodestar_core::metrics::compute_latency_percentiles;
///
/// let samples: Vec<Duration> = (1..=100)
///     .map(|i| Duration::from_micros(i * 10))
///     .collect();
///
/// let stats = compute_latency_percentiles(&samples);
/// assert!(stats.p99 > stats.p50);
/// ```
#[must_use]
pub fn compute_latency_percentiles(samples: &[Duration]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted: Vec<Duration> = samples.to_vec();
    sorted.sort();

    let n = sorted.len();
    let sum: Duration = sorted.iter().sum();

    // SAFETY: The mean of durations cannot exceed the maximum duration,
    // which fits in u64 nanoseconds.
    #[allow(clippy::cast_possible_truncation)]
    let mean = Duration::from_nanos((sum.as_nanos() / n as u128) as u64);

    LatencyStats {
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        p50: percentile(&sorted, 50),
        p95: percentile(&sorted, 95),
        p99: percentile(&sorted, 99),
    }
}

/// Computes a percentile from a sorted list of durations.
fn percentile(sorted: &[Duration], p: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let n = sorted.len();
    // SAFETY: p is in [0, 100], so the rounded index is in [0, n-1].
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let idx = ((p as f64 / 100.0) * (n - 1) as f64).round() as usize;
    sorted[idx.min(n - 1)]
}

/// Rolling window of the most recent latency samples.
#[derive(Debug)]
pub struct LatencyRecorder {
    window: Mutex<VecDeque<Duration>>,
    capacity: usize,
}

impl LatencyRecorder {
    /// Creates a recorder keeping at most `capacity` samples (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Records a sample, evicting the oldest one when full.
    pub fn record(&self, latency: Duration) {
        let mut window = self.window.lock();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(latency);
    }

    /// Percentiles over the current window.
    #[must_use]
    pub fn stats(&self) -> LatencyStats {
        let samples: Vec<Duration> = self.window.lock().iter().copied().collect();
        compute_latency_percentiles(&samples)
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new(1024)
    }
}
