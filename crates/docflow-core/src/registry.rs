//! Pluggable step handler registry (C3).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::{Error, Result};

/// One step implementation. Handlers read whatever context fields they need
/// and write only the fields they own; the DAG is responsible for ensuring
/// no two steps in the same layer own the same field.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run this step against the shared context, using the merged
    /// step+injected configuration.
    ///
    /// # Errors
    /// Returns [`Error::StepTransient`] for retryable failures (provider
    /// timeouts, transient DB errors) and [`Error::StepFatal`] for anything
    /// else.
    async fn run(&self, ctx: &mut WorkflowContext, cfg: &Value) -> Result<()>;
}

/// Name→handler map, populated once at startup.
#[derive(Default, Clone)]
pub struct StepRegistry {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl StepRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `kind`. A later call with the same kind
    /// replaces the earlier one.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Look up a handler by kind.
    ///
    /// # Errors
    /// Returns [`Error::UnknownStepKind`] if nothing is registered under
    /// `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownStepKind(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn run(&self, _ctx: &mut WorkflowContext, _cfg: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unknown_kind_errors() {
        let registry = StepRegistry::new();
        let err = registry.get("missing").expect_err("should be unknown");
        assert!(matches!(err, Error::UnknownStepKind(ref k) if k == "missing"));
    }

    #[tokio::test]
    async fn registered_handler_runs() {
        let mut registry = StepRegistry::new();
        registry.register("noop", Arc::new(Noop));
        let handler = registry.get("noop").expect("registered");
        let mut ctx = WorkflowContext::new("job-1", "doc-1", "application/pdf", Vec::new());
        handler.run(&mut ctx, &Value::Null).await.expect("runs");
    }
}
