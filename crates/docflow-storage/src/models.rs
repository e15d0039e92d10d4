//! Document and Job aggregates plus their status vocabularies.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Lifecycle status shared by Document and Job rows (invariant 1: a Job's
/// status matches its Document's status when the Job is the latest for that
/// Document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Intake accepted, not yet picked up by a worker.
    Queued,
    /// A worker is actively running the workflow.
    Processing,
    /// Workflow finished with no outstanding validation issues.
    Completed,
    /// Workflow finished but requires a human review item.
    ReviewPending,
    /// Workflow failed after exhausting retries.
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::ReviewPending => "review_pending",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "review_pending" => Ok(Self::ReviewPending),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::invalid_input(format!("bad_status:{other}"))),
        }
    }
}

/// The canonical record for one piece of ingested content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier.
    pub id: String,
    /// SHA-256 hash of `id || "|" || file_bytes`, set once extraction writes
    /// its first output.
    pub content_hash: String,
    /// Current lifecycle status.
    pub status: ProcessingStatus,
    /// When intake first created this row.
    pub received_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Most recent successful extraction payload.
    pub extraction_json: Value,
    /// Human-pinned field values. Monotone: keys accumulate, never removed
    /// (invariant 3).
    pub locked_fields: HashMap<String, Value>,
}

/// One processing attempt of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier.
    pub id: String,
    /// The document this job processes.
    pub document_id: String,
    /// Current lifecycle status (same vocabulary as [`Document::status`]).
    pub status: ProcessingStatus,
    /// When intake created this job.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// When a worker began processing, if it has started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Output artifact paths, keyed by kind (`"json"`, `"parquet"`).
    pub outputs: HashMap<String, String>,
    /// Short error tag, set only on failure.
    pub error: Option<String>,
    /// Linked review item id, set only when escalated (invariant 2).
    pub review_item_id: Option<String>,
}

/// Append-only event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Autoincrement row id.
    pub id: i64,
    /// The document this event concerns.
    pub document_id: String,
    /// The job this event concerns, if any.
    pub job_id: Option<String>,
    /// When the event occurred.
    pub at: DateTime<Utc>,
    /// Who or what performed the action (`"system"` for automated steps).
    pub actor: String,
    /// Short action tag (`"persisted"`, `"review_enqueued"`, ...).
    pub action: String,
    /// Structured details for this event.
    pub details: Value,
}
