//! `review_gate` step: escalates a run to human review when needed.

use async_trait::async_trait;
use serde_json::{json, Value};

use docflow_core::context::WorkflowContext;
use docflow_core::error::{Error, Result as CoreResult};
use docflow_core::registry::Handler;
use docflow_review::{classify, ReviewRepository};
use docflow_storage::{AuditRepository, JobRepository};

/// The `review_gate` step: if `ctx.needs_review`, creates a [`ReviewItem`]
/// with a classified reason, links it to the job, and audits the
/// escalation. A no-op otherwise.
pub struct ReviewGateStep {
    review: ReviewRepository,
    jobs: JobRepository,
    audit: AuditRepository,
}

impl ReviewGateStep {
    /// Wire the step against the repositories it writes to.
    #[must_use]
    pub fn new(review: ReviewRepository, jobs: JobRepository, audit: AuditRepository) -> Self {
        Self { review, jobs, audit }
    }
}

#[async_trait]
impl Handler for ReviewGateStep {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        if !ctx.needs_review {
            return Ok(());
        }

        let reason = classify(&ctx.validation_errors);
        let payload = ctx.extraction_payload.clone().unwrap_or(Value::Null);

        let item = self
            .review
            .create(&ctx.document_id, &ctx.job_id, reason, &payload, &ctx.locked_fields, None)
            .await
            .map_err(|e| Error::transient("review_gate", e.to_string()))?;

        self.jobs
            .set_review_item(&ctx.job_id, &item.id)
            .await
            .map_err(|e| Error::transient("review_gate", e.to_string()))?;

        self.audit
            .append(
                &ctx.document_id,
                Some(&ctx.job_id),
                "system",
                "review_enqueued",
                &json!({"review_item_id": item.id}),
            )
            .await
            .map_err(|e| Error::transient("review_gate", e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool")
    }

    #[tokio::test]
    async fn escalates_and_links_job_when_needed() {
        let pool = pool().await;
        let review = ReviewRepository::new(pool.clone()).await.expect("schema");
        let jobs = JobRepository::new(pool.clone()).await.expect("schema");
        let audit = AuditRepository::new(pool.clone()).await.expect("schema");
        jobs.create("job-1", "doc-1").await.expect("create job");

        let mut ctx = WorkflowContext::new("job-1", "doc-1", "application/pdf", Vec::new());
        ctx.needs_review = true;
        ctx.validation_errors = vec!["missing_required:currency".to_string()];

        let step = ReviewGateStep::new(review.clone(), jobs.clone(), audit.clone());
        step.run(&mut ctx, &Value::Null).await.expect("runs");

        let job = jobs.get("job-1").await.expect("fetch job");
        let review_item_id = job.review_item_id.expect("linked");

        let item = review.get(&review_item_id).await.expect("fetch item");
        assert_eq!(item.reason, "validation_failed");

        let entries = audit.list_for_document("doc-1").await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "review_enqueued");
    }

    #[tokio::test]
    async fn noop_when_not_needed() {
        let pool = pool().await;
        let review = ReviewRepository::new(pool.clone()).await.expect("schema");
        let jobs = JobRepository::new(pool.clone()).await.expect("schema");
        let audit = AuditRepository::new(pool.clone()).await.expect("schema");

        let mut ctx = WorkflowContext::new("job-1", "doc-1", "application/pdf", Vec::new());
        ctx.needs_review = false;

        let step = ReviewGateStep::new(review, jobs, audit.clone());
        step.run(&mut ctx, &Value::Null).await.expect("runs");

        let entries = audit.list_for_document("doc-1").await.expect("list");
        assert!(entries.is_empty());
    }
}
