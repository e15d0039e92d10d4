//! Wiring: builds the registry/graph/runner and drives one document through
//! them, following the two-commit-point pattern from the original system's
//! `worker.py` (see `DESIGN.md`).

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use docflow_core::context::WorkflowContext;
use docflow_core::{StepRegistry, WorkflowGraph, WorkflowRunner};
use docflow_extraction::{
    LlmExtractStep, NormalizeLineItemsStep, OcrStep, PersistStep, ReviewGateStep,
    StubStructuredExtractor, StubTextExtractor, ValidateStep, ValidationConfig, WriteOutputsStep,
};
use docflow_review::ReviewRepository;
use docflow_storage::{AuditRepository, DocumentRepository, JobRepository, ProcessingStatus};

use crate::broker::{ProcessTask, TaskBroker};
use crate::metrics::Metrics;

/// Shared application state, analogous to the teacher binary's `App`
/// (`isolate`/`zjj`'s `src/app.rs`): one instance is constructed at startup
/// and cloned (cheaply, via `Arc` fields) into every HTTP handler and the
/// broker-drain loop.
#[derive(Clone)]
pub struct AppState {
    /// Document repository.
    pub documents: DocumentRepository,
    /// Job repository.
    pub jobs: JobRepository,
    /// Audit log repository.
    pub audit: AuditRepository,
    /// Review queue repository.
    pub review: ReviewRepository,
    /// The compiled workflow runner.
    pub runner: Arc<WorkflowRunner>,
    /// Process-wide metrics.
    pub metrics: Arc<Metrics>,
    /// Task broker the HTTP intake endpoint enqueues onto.
    pub broker: Arc<dyn TaskBroker>,
}

/// Build the step registry for the invoice pipeline.
#[must_use]
pub fn build_registry(
    documents: DocumentRepository,
    jobs: JobRepository,
    audit: AuditRepository,
    review: ReviewRepository,
    validation_config: ValidationConfig,
    output_root: std::path::PathBuf,
) -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register("ocr", Arc::new(OcrStep::new(StubTextExtractor)));
    registry.register("llm_extract", Arc::new(LlmExtractStep::new(StubStructuredExtractor)));
    registry.register("normalize_line_items", Arc::new(NormalizeLineItemsStep::default()));
    registry.register("validate", Arc::new(ValidateStep::new(validation_config)));
    registry.register("write_outputs", Arc::new(WriteOutputsStep::new(output_root)));
    registry.register(
        "persist",
        Arc::new(PersistStep::new(documents, jobs.clone(), audit.clone())),
    );
    registry.register("review_gate", Arc::new(ReviewGateStep::new(review, jobs, audit)));
    registry
}

/// Run one document through the workflow, committing status before and
/// after the run so it is visible to readers at both points.
pub async fn process_document(state: &AppState, task: ProcessTask) {
    if let Err(err) = state.documents.create(&task.document_id).await {
        error!(error = %err, "failed to create document row");
        return;
    }
    if let Err(err) = state.jobs.create(&task.job_id, &task.document_id).await {
        error!(error = %err, "failed to create job row");
        return;
    }

    if let Err(err) = state.jobs.mark_started(&task.job_id).await {
        error!(error = %err, "failed to mark job started");
        return;
    }
    if let Err(err) = state.documents.set_status(&task.document_id, ProcessingStatus::Processing).await {
        error!(error = %err, "failed to mark document processing");
        return;
    }
    if let Err(err) = state
        .audit
        .append(&task.document_id, Some(&task.job_id), "system", "processing_started", &json!({}))
        .await
    {
        error!(error = %err, "failed to append processing_started audit entry");
        return;
    }

    let locked_fields = match state.documents.get(&task.document_id).await {
        Ok(doc) => doc.locked_fields,
        Err(err) => {
            error!(error = %err, "failed to load document for locked fields");
            std::collections::HashMap::new()
        }
    };

    let mut ctx = WorkflowContext::new(
        task.job_id.clone(),
        task.document_id.clone(),
        task.content_type.clone(),
        task.file_bytes.clone(),
    )
    .with_locked_fields(locked_fields);

    match state.runner.run(&mut ctx, &Value::Null).await {
        Ok(()) => {
            info!(job_id = %task.job_id, "workflow completed");
            state.metrics.record_processed();
        }
        Err(err) => {
            error!(job_id = %task.job_id, error = %err, "workflow failed");
            state.metrics.record_error();
            let error_tag = err.to_string();
            let _ = state.jobs.set_status(&task.job_id, ProcessingStatus::Failed, Some(&error_tag)).await;
            let _ = state.documents.set_status(&task.document_id, ProcessingStatus::Failed).await;
            let _ = state
                .audit
                .append(
                    &task.document_id,
                    Some(&task.job_id),
                    "system",
                    "processing_failed",
                    &json!({"error": error_tag}),
                )
                .await;
        }
    }
}

/// Build a [`WorkflowRunner`] from a loaded graph and registry.
///
/// # Errors
/// Returns a core error if the graph is structurally invalid.
pub fn build_runner(graph: WorkflowGraph, registry: StepRegistry) -> docflow_core::Result<WorkflowRunner> {
    WorkflowRunner::new(graph, registry)
}
