//! SLA metric computation, breach evaluation, and the periodic evaluation
//! loop (C9).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use docflow_review::ReviewRepository;
use docflow_storage::{JobRepository, ProcessingStatus};

use crate::config::{Comparator, SlaDef};
use crate::percentile::p95;
use crate::window::parse_window;

/// A single breach-failure threshold on job latency, used by
/// `sla_breach_percent`. Matches the original system's hardcoded 30s cutoff.
const BREACH_LATENCY_SECONDS: i64 = 30;

/// Result of evaluating one [`SlaDef`] for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaOutcome {
    /// The computed metric value.
    pub value: f64,
    /// Whether the value breaches its threshold.
    pub is_breaching: bool,
    /// Whether the comparator was recognized (always true today; kept for
    /// forward compatibility with new comparators).
    pub valid: bool,
}

/// Compute the five SLA metrics named in `SPEC_FULL.md` §4.9, as of `now`.
///
/// # Errors
/// Returns a storage error if the underlying repositories fail.
pub async fn compute_sla_values(
    jobs: &JobRepository,
    review: &ReviewRepository,
    now: DateTime<Utc>,
) -> Result<HashMap<String, f64>, docflow_storage::StorageError> {
    let mut values = HashMap::new();

    let jobs_5m = jobs.list_created_since(now - chrono::Duration::seconds(300)).await?;
    let latencies: Vec<f64> = jobs_5m
        .iter()
        .filter_map(|j| match (j.started_at, j.completed_at) {
            (Some(s), Some(c)) => Some((c - s).num_milliseconds() as f64 / 1000.0),
            _ => None,
        })
        .collect();
    values.insert("p95_latency_seconds".to_string(), p95(&latencies));

    let jobs_15m = jobs.list_created_since(now - chrono::Duration::seconds(900)).await?;
    let completed_15m = jobs_15m
        .iter()
        .filter(|j| matches!(j.status, ProcessingStatus::Completed | ProcessingStatus::ReviewPending))
        .count();
    values.insert(
        "docs_per_hour".to_string(),
        completed_15m as f64 / (900.0 / 3600.0),
    );

    let failed_5m = jobs_5m.iter().filter(|j| j.status == ProcessingStatus::Failed).count();
    let error_rate_percent = if jobs_5m.is_empty() {
        0.0
    } else {
        failed_5m as f64 / jobs_5m.len() as f64 * 100.0
    };
    values.insert("error_rate_percent".to_string(), error_rate_percent);

    let stats = review.stats_for_dashboard().await?;
    values.insert("review_queue_depth".to_string(), stats.queue_depth as f64);

    let jobs_1h = jobs.list_created_since(now - chrono::Duration::seconds(3600)).await?;
    let breaches_1h = jobs_1h
        .iter()
        .filter(|j| {
            j.status == ProcessingStatus::Failed
                || matches!(
                    (j.started_at, j.completed_at),
                    (Some(s), Some(c)) if (c - s).num_seconds() > BREACH_LATENCY_SECONDS
                )
        })
        .count();
    let sla_breach_percent = if jobs_1h.is_empty() {
        0.0
    } else {
        breaches_1h as f64 / jobs_1h.len() as f64 * 100.0
    };
    values.insert("sla_breach_percent".to_string(), sla_breach_percent);

    Ok(values)
}

/// Whether `value` breaches `threshold` under `comparator`.
#[must_use]
pub fn is_breaching(value: f64, comparator: Comparator, threshold: f64) -> bool {
    match comparator {
        Comparator::Lt => value >= threshold,
        Comparator::Gt => value <= threshold,
    }
}

/// Evaluate every [`SlaDef`] once against freshly computed metric values.
///
/// # Errors
/// Returns a storage error if metric computation fails.
pub async fn evaluate_slas_once(
    jobs: &JobRepository,
    review: &ReviewRepository,
    defs: &[SlaDef],
    now: DateTime<Utc>,
) -> Result<HashMap<String, SlaOutcome>, docflow_storage::StorageError> {
    // `window` is validated here (not used to bound the query further,
    // since each metric already has its window baked into its own query);
    // a malformed window surfaces immediately rather than silently at
    // whatever point a metric happens to reference it.
    for def in defs {
        if parse_window(&def.window).is_err() {
            warn!(sla = %def.name, window = %def.window, "unsupported SLA window");
        }
    }

    let values = compute_sla_values(jobs, review, now).await?;

    let mut outcomes = HashMap::new();
    for def in defs {
        let value = values.get(&def.name).copied().unwrap_or(0.0);
        let breaching = is_breaching(value, def.comparator, def.threshold);
        if breaching {
            warn!(sla = %def.name, value, threshold = def.threshold, severity = %def.severity, "SLA breach");
        }
        outcomes.insert(
            def.name.clone(),
            SlaOutcome { value, is_breaching: breaching, valid: true },
        );
    }
    Ok(outcomes)
}

/// Run [`evaluate_slas_once`] on a fixed 60s cadence until the process
/// exits. Stands in for the Celery-beat periodic task in the original
/// system.
pub async fn run_evaluation_loop(
    jobs: Arc<JobRepository>,
    review: Arc<ReviewRepository>,
    defs: Vec<SlaDef>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        match evaluate_slas_once(&jobs, &review, &defs, Utc::now()).await {
            Ok(outcomes) => {
                for (name, outcome) in outcomes {
                    if outcome.is_breaching {
                        warn!(sla = %name, value = outcome.value, "breaching on scheduled tick");
                    }
                }
            }
            Err(err) => warn!(error = %err, "SLA evaluation tick failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lt_comparator_breaches_at_or_above_threshold() {
        assert!(is_breaching(31.0, Comparator::Lt, 30.0));
        assert!(is_breaching(30.0, Comparator::Lt, 30.0));
        assert!(!is_breaching(29.9, Comparator::Lt, 30.0));
    }

    #[test]
    fn gt_comparator_breaches_at_or_below_threshold() {
        assert!(is_breaching(5.0, Comparator::Gt, 10.0));
        assert!(is_breaching(10.0, Comparator::Gt, 10.0));
        assert!(!is_breaching(10.1, Comparator::Gt, 10.0));
    }
}
