//! Review item type and priority assignment (C8).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docflow_storage::StorageError;

/// Lifecycle status of a [`ReviewItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a reviewer, not yet submitted.
    Claimed,
    /// Submitted as approved or corrected.
    Completed,
    /// Submitted as rejected.
    Rejected,
}

impl ReviewStatus {
    /// Terminal statuses cannot be claimed or submitted again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(StorageError::invalid_input(format!("bad_review_status:{other}"))),
        }
    }
}

/// A unit of human review work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Opaque identifier (uuid v4).
    pub id: String,
    /// The document under review.
    pub document_id: String,
    /// The job that escalated this item.
    pub job_id: String,
    /// When this item was created.
    pub created_at: DateTime<Utc>,
    /// When a reviewer claimed it, if claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When it reached a terminal status, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// The deadline by which review should complete.
    pub sla_deadline: DateTime<Utc>,
    /// Priority band, a pure function of `sla_deadline - created_at` at
    /// creation time (invariant 4): one of 100, 80, 60, 40.
    pub priority: i64,
    /// Current lifecycle status.
    pub status: ReviewStatus,
    /// The reviewer currently or finally assigned, if any.
    pub assigned_to: Option<String>,
    /// Machine-readable escalation reason.
    pub reason: String,
    /// Extraction payload snapshot at enqueue time.
    pub extraction_json: Value,
    /// Locked fields, including any corrections merged in on submit.
    pub locked_fields: HashMap<String, Value>,
}

/// Default review SLA when the caller doesn't override it.
pub const DEFAULT_SLA_MINUTES: i64 = 240;

/// Compute the priority band for a deadline, per §4.8: the remaining whole
/// minutes until `deadline` (floored at 0) maps to one of four bands.
#[must_use]
pub fn priority_for_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let mins = ((deadline - now).num_seconds() / 60).max(0);
    if mins <= 30 {
        100
    } else if mins <= 60 {
        80
    } else if mins <= 120 {
        60
    } else {
        40
    }
}

/// Compute the SLA deadline for a new item created `now`, `sla_minutes`
/// ahead.
#[must_use]
pub fn deadline_from_now(now: DateTime<Utc>, sla_minutes: i64) -> DateTime<Utc> {
    now + Duration::minutes(sla_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bands() {
        let now = Utc::now();
        assert_eq!(priority_for_deadline(now + Duration::minutes(10), now), 100);
        assert_eq!(priority_for_deadline(now + Duration::minutes(45), now), 80);
        assert_eq!(priority_for_deadline(now + Duration::minutes(90), now), 60);
        assert_eq!(priority_for_deadline(now + Duration::minutes(300), now), 40);
    }

    #[test]
    fn past_deadline_floors_at_zero_minutes() {
        let now = Utc::now();
        assert_eq!(priority_for_deadline(now - Duration::minutes(5), now), 100);
    }
}
