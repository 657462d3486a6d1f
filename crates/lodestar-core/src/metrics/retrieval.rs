//! Retrieval quality metrics.

use std::collections::HashSet;
use std::hash::Hash;

/// Calculates Recall@k: the proportion of true neighbors found in the results.
///
/// `recall@k = |ground_truth ∩ results| / |ground_truth|`
///
/// Returns 0.0 if `ground_truth` is empty.
#[must_use]
pub fn recall_at_k<T: Eq + Hash>(ground_truth: &[T], results: &[T]) -> f64 {
    if ground_truth.is_empty() {
        return 0.0;
    }

    let truth_set: HashSet<&T> = ground_truth.iter().collect();
    let found = results.iter().filter(|id| truth_set.contains(id)).count();

    #[allow(clippy::cast_precision_loss)]
    let recall = found as f64 / ground_truth.len() as f64;
    recall
}

/// Calculates Precision@k: the proportion of relevant results among those returned.
///
/// Returns 0.0 if `results` is empty.
#[must_use]
pub fn precision_at_k<T: Eq + Hash>(ground_truth: &[T], results: &[T]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }

    let truth_set: HashSet<&T> = ground_truth.iter().collect();
    let relevant = results.iter().filter(|id| truth_set.contains(id)).count();

    #[allow(clippy::cast_precision_loss)]
    let precision = relevant as f64 / results.len() as f64;
    precision
}

/// Reciprocal rank of the first relevant result, 0.0 if none is relevant.
#[must_use]
pub fn mrr<T: Eq + Hash>(ground_truth: &[T], results: &[T]) -> f64 {
    let truth_set: HashSet<&T> = ground_truth.iter().collect();

    #[allow(clippy::cast_precision_loss)]
    results
        .iter()
        .position(|id| truth_set.contains(id))
        .map_or(0.0, |rank| 1.0 / (rank + 1) as f64)
}
