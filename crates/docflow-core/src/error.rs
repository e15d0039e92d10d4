//! Crate-wide error taxonomy for the workflow engine.

use thiserror::Error;

/// Errors raised by the DAG, runner, registry, and rate limiter.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// A step's `depends_on` names a step that does not exist in the graph.
    #[error("unknown_dependency:{0}")]
    UnknownDependency(String),

    /// The graph contains a cycle.
    #[error("cycle_detected")]
    CycleDetected,

    /// Topological layering did not cover every step (implies a cycle or a
    /// structural bug in the layering algorithm).
    #[error("cycle_or_missing_nodes")]
    CycleOrMissingNodes,

    /// `StepRegistry::get` was called with an unregistered kind.
    #[error("unknown_step_kind:{0}")]
    UnknownStepKind(String),

    /// A step failed in a way that should not be retried.
    #[error("step_fatal:{step}:{message}")]
    StepFatal {
        /// Name of the step that failed.
        step: String,
        /// Short, user-safe description.
        message: String,
    },

    /// A step failed transiently; the runner retries up to the step's
    /// configured attempt count before surfacing [`Error::StepFatal`].
    #[error("step_transient:{step}:{message}")]
    StepTransient {
        /// Name of the step that failed.
        step: String,
        /// Short, user-safe description.
        message: String,
    },

    /// Configuration failed to parse or was structurally invalid.
    #[error("config_invalid:{0}")]
    ConfigInvalid(String),
}

/// Result alias used throughout the workflow engine.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a transient failure from a step, e.g. a provider timeout.
    #[must_use]
    pub fn transient(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepTransient {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Wrap a non-retryable failure from a step.
    #[must_use]
    pub fn fatal(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFatal {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Whether the runner should retry this error if attempts remain.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StepTransient { .. })
    }
}
