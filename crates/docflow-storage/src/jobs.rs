//! Job repository: sqlx/SQLite.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::{StorageError, StorageResult};
use crate::models::{Job, ProcessingStatus};

/// Owns the `jobs` table.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Connect to `pool` and ensure the `jobs` table exists.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                outputs TEXT NOT NULL DEFAULT '{}',
                error TEXT,
                review_item_id TEXT
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_document_status ON jobs(document_id, status)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    /// Create a new job row with status `queued`.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn create(&self, job_id: &str, document_id: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r"
            INSERT INTO jobs (id, document_id, status, created_at, updated_at, outputs)
            VALUES (?1, ?2, 'queued', ?3, ?3, '{}')
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(job_id)
        .bind(document_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a job by id.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if no row matches.
    pub async fn get(&self, job_id: &str) -> StorageResult<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(job_id))?;
        row_to_job(&row)
    }

    /// Mark a job `processing` and stamp `started_at`. Called before the
    /// runner executes so the status is visible to readers immediately,
    /// matching the two-commit-point pattern documented in `DESIGN.md`.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn mark_started(&self, job_id: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set an arbitrary status, optionally recording a short error tag.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn set_status(
        &self,
        job_id: &str,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        sqlx::query("UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(status.to_string())
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a job terminal (`completed` or `review_pending`) and stamp
    /// `completed_at`.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn mark_completed(&self, job_id: &str, status: ProcessingStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = ?1, completed_at = ?2, updated_at = ?2 WHERE id = ?3",
        )
        .bind(status.to_string())
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record output artifact paths.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`]/[`StorageError::Serialization`] on
    /// failure.
    pub async fn set_outputs(&self, job_id: &str, outputs: &HashMap<String, String>) -> StorageResult<()> {
        let raw = serde_json::to_string(outputs)?;
        sqlx::query("UPDATE jobs SET outputs = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(raw)
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List jobs created at or after `since`, for SLA window computations.
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub async fn list_created_since(&self, since: chrono::DateTime<Utc>) -> StorageResult<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE created_at >= ?1")
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Link a created review item back to this job (invariant 2).
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn set_review_item(&self, job_id: &str, review_item_id: &str) -> StorageResult<()> {
        sqlx::query("UPDATE jobs SET review_item_id = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(review_item_id)
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> StorageResult<Job> {
    let status_raw: String = row.try_get("status")?;
    let outputs_raw: String = row.try_get("outputs")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;
    let started_raw: Option<String> = row.try_get("started_at")?;
    let completed_raw: Option<String> = row.try_get("completed_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        status: ProcessingStatus::from_str(&status_raw)?,
        created_at: parse_rfc3339(&created_raw)?,
        updated_at: parse_rfc3339(&updated_raw)?,
        started_at: started_raw.map(|s| parse_rfc3339(&s)).transpose()?,
        completed_at: completed_raw.map(|s| parse_rfc3339(&s)).transpose()?,
        outputs: serde_json::from_str(&outputs_raw)?,
        error: row.try_get("error")?,
        review_item_id: row.try_get("review_item_id")?,
    })
}

fn parse_rfc3339(raw: &str) -> StorageResult<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::invalid_input(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool")
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let repo = JobRepository::new(test_pool().await).await.expect("schema");
        repo.create("job-1", "doc-1").await.expect("create");
        repo.mark_started("job-1").await.expect("start");

        let job = repo.get("job-1").await.expect("fetch");
        assert_eq!(job.status, ProcessingStatus::Processing);
        assert!(job.started_at.is_some());

        repo.mark_completed("job-1", ProcessingStatus::Completed)
            .await
            .expect("complete");
        let job = repo.get("job-1").await.expect("fetch");
        assert_eq!(job.status, ProcessingStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn failure_records_error_tag() {
        let repo = JobRepository::new(test_pool().await).await.expect("schema");
        repo.create("job-1", "doc-1").await.expect("create");
        repo.set_status("job-1", ProcessingStatus::Failed, Some("step_fatal"))
            .await
            .expect("fail");
        let job = repo.get("job-1").await.expect("fetch");
        assert_eq!(job.status, ProcessingStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("step_fatal"));
    }
}
