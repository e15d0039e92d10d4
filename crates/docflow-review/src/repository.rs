//! Review item repository: priority queue with race-free claim semantics.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docflow_storage::{StorageError, StorageResult};

use crate::model::{deadline_from_now, priority_for_deadline, ReviewItem, ReviewStatus, DEFAULT_SLA_MINUTES};

/// Decision made by a reviewer on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Accept the extraction as-is.
    Approve,
    /// Accept with corrections merged into locked fields.
    Correct,
    /// Reject the item.
    Reject,
}

/// Dashboard summary statistics, matching the original system's
/// `stats_for_dashboard` response shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardStats {
    /// Count of currently pending items.
    pub queue_depth: i64,
    /// Completed or rejected today (since local midnight).
    pub reviewed_today: i64,
    /// Mean seconds between claim and completion over the last 24h.
    pub avg_review_time_seconds: f64,
    /// Percentage of last-24h completions that beat their SLA deadline.
    pub sla_compliance_pct: f64,
}

/// Owns the `review_items` table.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    /// Connect to `pool` and ensure the `review_items` table exists.
    ///
    /// # Errors
    /// Returns a database error if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS review_items (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                claimed_at TEXT,
                completed_at TEXT,
                sla_deadline TEXT NOT NULL,
                priority INTEGER NOT NULL,
                status TEXT NOT NULL,
                assigned_to TEXT,
                reason TEXT NOT NULL,
                extraction_json TEXT NOT NULL DEFAULT '{}',
                locked_fields TEXT NOT NULL DEFAULT '{}'
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_review_status_priority ON review_items(status, priority, sla_deadline)",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Create a new pending review item with a deadline `sla_minutes` from
    /// now (default [`DEFAULT_SLA_MINUTES`]).
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub async fn create(
        &self,
        document_id: &str,
        job_id: &str,
        reason: &str,
        extraction_json: &Value,
        locked_fields: &HashMap<String, Value>,
        sla_minutes: Option<i64>,
    ) -> StorageResult<ReviewItem> {
        let now = Utc::now();
        let deadline = deadline_from_now(now, sla_minutes.unwrap_or(DEFAULT_SLA_MINUTES));
        let priority = priority_for_deadline(deadline, now);
        let id = Uuid::new_v4().to_string();

        let extraction_raw = serde_json::to_string(extraction_json)?;
        let locked_raw = serde_json::to_string(locked_fields)?;

        sqlx::query(
            r"
            INSERT INTO review_items
              (id, document_id, job_id, created_at, sla_deadline, priority, status, reason, extraction_json, locked_fields)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)
            ",
        )
        .bind(&id)
        .bind(document_id)
        .bind(job_id)
        .bind(now.to_rfc3339())
        .bind(deadline.to_rfc3339())
        .bind(priority)
        .bind(reason)
        .bind(extraction_raw)
        .bind(locked_raw)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    /// Fetch one item by id.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if no row matches.
    pub async fn get(&self, review_id: &str) -> StorageResult<ReviewItem> {
        let row = sqlx::query("SELECT * FROM review_items WHERE id = ?1")
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(review_id))?;
        row_to_item(&row)
    }

    /// List pending items (plus `user`'s own claimed items, if given),
    /// ordered by priority desc then deadline asc.
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub async fn list_pending(
        &self,
        limit: i64,
        offset: i64,
        user: Option<&str>,
    ) -> StorageResult<Vec<ReviewItem>> {
        let rows = if let Some(user) = user {
            sqlx::query(
                r"
                SELECT * FROM review_items
                WHERE status = 'pending' OR (status = 'claimed' AND assigned_to = ?1)
                ORDER BY priority DESC, sla_deadline ASC
                LIMIT ?2 OFFSET ?3
                ",
            )
            .bind(user)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r"
                SELECT * FROM review_items
                WHERE status = 'pending'
                ORDER BY priority DESC, sla_deadline ASC
                LIMIT ?1 OFFSET ?2
                ",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_item).collect()
    }

    /// Atomically claim the single highest-priority pending item (ties
    /// broken by earliest deadline) for `user`. SQLite serializes writers at
    /// the statement level, so this single `UPDATE ... WHERE id = (SELECT
    /// ...) RETURNING *` is indivisible from any other connection's point of
    /// view — the SQLite-native equivalent of `FOR UPDATE SKIP LOCKED` for a
    /// single-row pop.
    ///
    /// # Errors
    /// Returns a database or serialization error. An empty queue is not an
    /// error; it returns `Ok(None)`.
    pub async fn claim_next(&self, user: &str) -> StorageResult<Option<ReviewItem>> {
        let row = sqlx::query(
            r"
            UPDATE review_items
            SET status = 'claimed', assigned_to = ?1, claimed_at = ?2
            WHERE id = (
                SELECT id FROM review_items
                WHERE status = 'pending'
                ORDER BY priority DESC, sla_deadline ASC
                LIMIT 1
            )
            RETURNING *
            ",
        )
        .bind(user)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    /// Submit a decision for a claimed (or still-pending) item.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the item doesn't exist, or
    /// [`StorageError::InvalidInput`] if it is already terminal.
    pub async fn submit(
        &self,
        review_id: &str,
        decision: Decision,
        user: &str,
        corrections: &HashMap<String, Value>,
        reject_reason: Option<&str>,
    ) -> StorageResult<ReviewItem> {
        let item = self.get(review_id).await?;
        if item.status.is_terminal() {
            return Err(StorageError::invalid_input(format!(
                "illegal_state:review_already_{}",
                item.status
            )));
        }

        let now = Utc::now();
        match decision {
            Decision::Approve | Decision::Correct => {
                let mut locked = item.locked_fields.clone();
                locked.extend(corrections.clone());
                let locked_raw = serde_json::to_string(&locked)?;
                sqlx::query(
                    "UPDATE review_items SET status = 'completed', assigned_to = ?1, completed_at = ?2, locked_fields = ?3 WHERE id = ?4",
                )
                .bind(user)
                .bind(now.to_rfc3339())
                .bind(locked_raw)
                .bind(review_id)
                .execute(&self.pool)
                .await?;
            }
            Decision::Reject => {
                let reason = match reject_reason {
                    Some(r) if !r.is_empty() => format!("{} | rejected_reason={r}", item.reason),
                    _ => item.reason.clone(),
                };
                sqlx::query(
                    "UPDATE review_items SET status = 'rejected', assigned_to = ?1, completed_at = ?2, reason = ?3 WHERE id = ?4",
                )
                .bind(user)
                .bind(now.to_rfc3339())
                .bind(reason)
                .bind(review_id)
                .execute(&self.pool)
                .await?;
            }
        }

        self.get(review_id).await
    }

    /// Compute dashboard summary statistics.
    ///
    /// # Errors
    /// Returns a database error.
    pub async fn stats_for_dashboard(&self) -> StorageResult<DashboardStats> {
        let now = Utc::now();
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_else(|| now.naive_utc())
            .and_utc();
        let window_24h = now - chrono::Duration::hours(24);

        let queue_depth: i64 = sqlx::query("SELECT COUNT(*) AS c FROM review_items WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?
            .try_get("c")?;

        let reviewed_today: i64 = sqlx::query(
            "SELECT COUNT(*) AS c FROM review_items WHERE status IN ('completed','rejected') AND completed_at >= ?1",
        )
        .bind(today_start.to_rfc3339())
        .fetch_one(&self.pool)
        .await?
        .try_get("c")?;

        let durations: Vec<(String, String)> = sqlx::query(
            r"
            SELECT claimed_at, completed_at FROM review_items
            WHERE status IN ('completed','rejected')
              AND completed_at >= ?1
              AND claimed_at IS NOT NULL AND completed_at IS NOT NULL
            ",
        )
        .bind(window_24h.to_rfc3339())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> StorageResult<(String, String)> {
            Ok((row.try_get("claimed_at")?, row.try_get("completed_at")?))
        })
        .collect::<StorageResult<Vec<_>>>()?;

        let avg_review_time_seconds = if durations.is_empty() {
            0.0
        } else {
            let total: i64 = durations
                .iter()
                .filter_map(|(claimed, completed)| {
                    let claimed = chrono::DateTime::parse_from_rfc3339(claimed).ok()?;
                    let completed = chrono::DateTime::parse_from_rfc3339(completed).ok()?;
                    Some((completed - claimed).num_seconds())
                })
                .sum();
            total as f64 / durations.len() as f64
        };

        let total_24h: i64 = sqlx::query(
            "SELECT COUNT(*) AS c FROM review_items WHERE status IN ('completed','rejected') AND completed_at >= ?1",
        )
        .bind(window_24h.to_rfc3339())
        .fetch_one(&self.pool)
        .await?
        .try_get("c")?;

        let ontime_24h: i64 = sqlx::query(
            "SELECT COUNT(*) AS c FROM review_items WHERE status IN ('completed','rejected') AND completed_at >= ?1 AND completed_at <= sla_deadline",
        )
        .bind(window_24h.to_rfc3339())
        .fetch_one(&self.pool)
        .await?
        .try_get("c")?;

        let sla_compliance_pct = if total_24h == 0 {
            100.0
        } else {
            (ontime_24h as f64 / total_24h as f64) * 100.0
        };

        Ok(DashboardStats {
            queue_depth,
            reviewed_today,
            avg_review_time_seconds,
            sla_compliance_pct,
        })
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> StorageResult<ReviewItem> {
    let status_raw: String = row.try_get("status")?;
    let created_raw: String = row.try_get("created_at")?;
    let claimed_raw: Option<String> = row.try_get("claimed_at")?;
    let completed_raw: Option<String> = row.try_get("completed_at")?;
    let deadline_raw: String = row.try_get("sla_deadline")?;
    let extraction_raw: String = row.try_get("extraction_json")?;
    let locked_raw: String = row.try_get("locked_fields")?;

    Ok(ReviewItem {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        job_id: row.try_get("job_id")?,
        created_at: parse_rfc3339(&created_raw)?,
        claimed_at: claimed_raw.map(|s| parse_rfc3339(&s)).transpose()?,
        completed_at: completed_raw.map(|s| parse_rfc3339(&s)).transpose()?,
        sla_deadline: parse_rfc3339(&deadline_raw)?,
        priority: row.try_get("priority")?,
        status: ReviewStatus::from_str(&status_raw)?,
        assigned_to: row.try_get("assigned_to")?,
        reason: row.try_get("reason")?,
        extraction_json: serde_json::from_str(&extraction_raw)?,
        locked_fields: serde_json::from_str(&locked_raw)?,
    })
}

fn parse_rfc3339(raw: &str) -> StorageResult<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::invalid_input(e.to_string()))
}
