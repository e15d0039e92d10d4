//! Layered scheduling, retry/backoff, and rate limiting for a workflow run (C5).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::context::WorkflowContext;
use crate::error::{Error, Result};
use crate::graph::WorkflowGraph;
use crate::rate_limit::TokenBucket;
use crate::registry::StepRegistry;

/// Cap on the exponential backoff delay between step retries, in seconds.
const MAX_BACKOFF_SECS: f64 = 6.0;
/// Base of the exponential backoff series: `0.5 * 2^attempt`.
const BACKOFF_BASE_SECS: f64 = 0.5;

fn jitter(seconds: f64) -> f64 {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    seconds * factor
}

fn backoff_delay(attempt: u32) -> Duration {
    let raw = BACKOFF_BASE_SECS * 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    Duration::from_secs_f64(jitter(raw.min(MAX_BACKOFF_SECS)))
}

/// Executes a [`WorkflowGraph`] layer by layer against a [`StepRegistry`],
/// applying per-step rate limiting and retry-with-backoff.
pub struct WorkflowRunner {
    graph: WorkflowGraph,
    registry: StepRegistry,
    limiters: BTreeMap<String, Arc<TokenBucket>>,
}

impl WorkflowRunner {
    /// Build a runner from a validated graph and a populated registry.
    /// Constructs one [`TokenBucket`] per step that configures both
    /// `rate_limit_rps` and `rate_limit_burst`.
    ///
    /// # Errors
    /// Returns [`Error::CycleDetected`] or [`Error::UnknownDependency`] if
    /// the graph is structurally invalid.
    pub fn new(graph: WorkflowGraph, registry: StepRegistry) -> Result<Self> {
        graph.validate()?;

        let mut limiters = BTreeMap::new();
        for name in graph.step_names() {
            if let Some(spec) = graph.get(name) {
                if let (Some(rps), Some(burst)) = (spec.rate_limit_rps, spec.rate_limit_burst) {
                    limiters.insert(name.to_string(), Arc::new(TokenBucket::new(rps, burst)));
                }
            }
        }

        Ok(Self {
            graph,
            registry,
            limiters,
        })
    }

    /// Run every layer of the graph in order. Steps within a layer run
    /// concurrently; a failure in one step does not cancel its peers, but
    /// no further layer starts once any step in the current layer fails.
    ///
    /// # Errors
    /// Returns the first step's terminal [`Error::StepFatal`] (or an
    /// exhausted [`Error::StepTransient`] promoted to fatal) encountered.
    pub async fn run(
        &self,
        ctx: &mut WorkflowContext,
        injected: &Value,
    ) -> Result<()> {
        let layers = self.graph.topological_layers()?;

        for layer in layers {
            // Run every step in this layer against its own context clone so
            // peers don't race on shared mutable state; merge writes back in
            // deterministic (lexicographic) order afterward.
            let futures = layer.iter().map(|name| {
                let mut step_ctx = ctx.clone();
                let name = name.clone();
                async move {
                    let result = self.run_step(&name, &mut step_ctx, injected).await;
                    (name, step_ctx, result)
                }
            });

            let outcomes = join_all(futures).await;

            let mut first_error = None;
            for (name, step_ctx, result) in outcomes {
                merge_context(ctx, &step_ctx, &name);
                if let Err(err) = result {
                    warn!(step = %name, error = %err, "step failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }

            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(())
    }

    async fn run_step(
        &self,
        name: &str,
        ctx: &mut WorkflowContext,
        injected: &Value,
    ) -> Result<()> {
        let spec = self
            .graph
            .get(name)
            .ok_or_else(|| Error::UnknownStepKind(name.to_string()))?;
        let handler = self.registry.get(&spec.kind)?;
        let limiter = self.limiters.get(name).cloned();
        let attempts = spec.retries.max(1);

        let mut last_err = None;
        for attempt in 0..attempts {
            if let Some(limiter) = &limiter {
                limiter.take(1.0).await;
            }

            match handler.run(ctx, injected).await {
                Ok(()) => {
                    info!(step = %name, attempt, "step completed");
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    warn!(step = %name, attempt, error = %err, "retrying step");
                    last_err = Some(err);
                    sleep(backoff_delay(attempt)).await;
                }
                Err(err) => {
                    return Err(promote_to_fatal(name, err));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::fatal(name, "exhausted retries")))
    }
}

fn promote_to_fatal(step: &str, err: Error) -> Error {
    match err {
        Error::StepTransient { message, .. } => Error::fatal(step, message),
        other => other,
    }
}

/// Copy a finished step's owned outputs back into the shared context. Each
/// step is expected to write only the fields it owns, so a field-wise merge
/// (rather than a full clone) keeps concurrent peers from clobbering each
/// other even though each ran on its own clone.
fn merge_context(ctx: &mut WorkflowContext, step_ctx: &WorkflowContext, _step_name: &str) {
    if step_ctx.text.is_some() {
        ctx.text = step_ctx.text.clone();
    }
    if !step_ctx.fields.is_empty() {
        ctx.fields = step_ctx.fields.clone();
    }
    if !step_ctx.field_confidence.is_empty() {
        ctx.field_confidence = step_ctx.field_confidence.clone();
    }
    if !step_ctx.validation_errors.is_empty() {
        ctx.validation_errors = step_ctx.validation_errors.clone();
    }
    if !step_ctx.outputs.is_empty() {
        ctx.outputs.extend(step_ctx.outputs.clone());
    }
    ctx.needs_review = ctx.needs_review || step_ctx.needs_review;
    if step_ctx.extraction_payload.is_some() {
        ctx.extraction_payload = step_ctx.extraction_payload.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StepSpec;
    use crate::registry::Handler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;
    use tokio::time::Duration as TokioDuration;

    struct Sleepy(TokioDuration);

    #[async_trait]
    impl Handler for Sleepy {
        async fn run(&self, _ctx: &mut WorkflowContext, _cfg: &Value) -> Result<()> {
            sleep(self.0).await;
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Handler for AlwaysFails {
        async fn run(&self, _ctx: &mut WorkflowContext, _cfg: &Value) -> Result<()> {
            Err(Error::transient("always_fails", "boom"))
        }
    }

    struct FailsThenSucceeds(Arc<AtomicU32>);

    #[async_trait]
    impl Handler for FailsThenSucceeds {
        async fn run(&self, _ctx: &mut WorkflowContext, _cfg: &Value) -> Result<()> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Error::transient("flaky", "first try"))
            } else {
                Ok(())
            }
        }
    }

    fn spec(kind: &str, depends_on: &[&str], retries: u32) -> StepSpec {
        StepSpec {
            kind: kind.to_string(),
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            retries,
            rate_limit_rps: None,
            rate_limit_burst: None,
            max_concurrency: None,
        }
    }

    #[tokio::test]
    async fn parallel_layer_runs_concurrently() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec("fast", &[], 1));
        steps.insert("b".to_string(), spec("slow", &["a"], 1));
        steps.insert("c".to_string(), spec("slow", &["a"], 1));
        steps.insert("d".to_string(), spec("fast", &["b", "c"], 1));
        let graph = WorkflowGraph::new(steps);

        struct Fast;
        #[async_trait]
        impl Handler for Fast {
            async fn run(&self, _ctx: &mut WorkflowContext, _cfg: &Value) -> Result<()> {
                Ok(())
            }
        }

        let mut registry = StepRegistry::new();
        registry.register("fast", Arc::new(Fast));
        registry.register("slow", Arc::new(Sleepy(TokioDuration::from_millis(250))));

        let runner = WorkflowRunner::new(graph, registry).expect("valid");
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());

        let start = Instant::now();
        runner.run(&mut ctx, &Value::Null).await.expect("runs");
        assert!(start.elapsed() < TokioDuration::from_millis(400));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec("flaky", &[], 3));
        let graph = WorkflowGraph::new(steps);

        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = StepRegistry::new();
        registry.register("flaky", Arc::new(FailsThenSucceeds(counter.clone())));

        let runner = WorkflowRunner::new(graph, registry).expect("valid");
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        runner.run(&mut ctx, &Value::Null).await.expect("eventually succeeds");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_fatal() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec("always_fails", &[], 2));
        let graph = WorkflowGraph::new(steps);

        let mut registry = StepRegistry::new();
        registry.register("always_fails", Arc::new(AlwaysFails));

        let runner = WorkflowRunner::new(graph, registry).expect("valid");
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        let err = runner.run(&mut ctx, &Value::Null).await.expect_err("should fail");
        assert!(matches!(err, Error::StepFatal { .. }));
    }

    #[tokio::test]
    async fn sibling_failure_does_not_cancel_peer() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec("always_fails", &[], 1));
        steps.insert("b".to_string(), spec("slow", &[], 1));
        let graph = WorkflowGraph::new(steps);

        let mut registry = StepRegistry::new();
        registry.register("always_fails", Arc::new(AlwaysFails));
        registry.register("slow", Arc::new(Sleepy(TokioDuration::from_millis(50))));

        let runner = WorkflowRunner::new(graph, registry).expect("valid");
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        let err = runner.run(&mut ctx, &Value::Null).await.expect_err("a fails");
        assert!(matches!(err, Error::StepFatal { .. }));
    }
}
