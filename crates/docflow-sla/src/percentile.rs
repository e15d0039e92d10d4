//! Nearest-rank percentile computation, used for `p95_latency_seconds`.

/// Compute the 95th percentile of `values` using the nearest-rank method:
/// sort ascending and take the element at index `max(0, ceil(0.95*n) - 1)`.
/// A single value in the window is itself the p95. Returns `0.0` for an
/// empty slice.
#[must_use]
pub fn p95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let rank = (0.95 * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}
