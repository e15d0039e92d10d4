//! `persist` step: writes the extraction payload and status to storage and
//! appends an audit entry.

use async_trait::async_trait;
use serde_json::{json, Value};

use docflow_core::context::WorkflowContext;
use docflow_core::error::{Error, Result as CoreResult};
use docflow_core::registry::Handler;
use docflow_storage::{AuditRepository, DocumentRepository, JobRepository, ProcessingStatus};

/// The `persist` step: under the document/job repositories, records the
/// final extraction payload, status, and an audit entry.
pub struct PersistStep {
    documents: DocumentRepository,
    jobs: JobRepository,
    audit: AuditRepository,
}

impl PersistStep {
    /// Wire the step against the three repositories it writes to.
    #[must_use]
    pub fn new(documents: DocumentRepository, jobs: JobRepository, audit: AuditRepository) -> Self {
        Self { documents, jobs, audit }
    }
}

#[async_trait]
impl Handler for PersistStep {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let payload = ctx
            .extraction_payload
            .clone()
            .ok_or_else(|| Error::fatal("persist", "missing_extraction_payload"))?;

        let content_hash = payload
            .get("content_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = if ctx.needs_review {
            ProcessingStatus::ReviewPending
        } else {
            ProcessingStatus::Completed
        };

        self.documents
            .set_extraction(&ctx.document_id, &content_hash, &payload)
            .await
            .map_err(|e| Error::transient("persist", e.to_string()))?;
        self.documents
            .set_status(&ctx.document_id, status)
            .await
            .map_err(|e| Error::transient("persist", e.to_string()))?;

        self.jobs
            .mark_completed(&ctx.job_id, status)
            .await
            .map_err(|e| Error::transient("persist", e.to_string()))?;
        self.jobs
            .set_outputs(&ctx.job_id, &ctx.outputs)
            .await
            .map_err(|e| Error::transient("persist", e.to_string()))?;

        self.audit
            .append(
                &ctx.document_id,
                Some(&ctx.job_id),
                "system",
                "persisted",
                &json!({"status": status.to_string(), "outputs": ctx.outputs}),
            )
            .await
            .map_err(|e| Error::transient("persist", e.to_string()))?;

        Ok(())
    }
}
