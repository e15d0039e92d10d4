//! In-process metrics registry. No external metrics backend is wired
//! (observability integrations are out of scope); this exposes plain
//! counters/gauges for the `/metrics` endpoint and the SLA evaluator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, cheap to clone (wraps `Arc`-free atomics behind
/// shared references since the struct itself is held behind an `Arc` in
/// `AppState`).
#[derive(Debug, Default)]
pub struct Metrics {
    docs_processed: AtomicU64,
    errors: AtomicU64,
    sla_breaches: AtomicU64,
}

impl Metrics {
    /// Increment the successfully-processed document counter.
    pub fn record_processed(&self) {
        self.docs_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the processing-error counter.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the SLA-breach counter.
    pub fn record_sla_breach(&self) {
        self.sla_breaches.fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in a simple `name value` text format.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "docflow_docs_processed_total {}\ndocflow_errors_total {}\ndocflow_sla_breaches_total {}\n",
            self.docs_processed.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.sla_breaches.load(Ordering::Relaxed),
        )
    }
}
