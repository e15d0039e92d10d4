//! Append-only audit log repository.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::StorageResult;
use crate::models::AuditLogEntry;

/// Owns the `audit_log` table. The core never mutates past entries; this
/// repository exposes only `append` and read methods.
#[derive(Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Connect to `pool` and ensure the `audit_log` table exists.
    ///
    /// # Errors
    /// Returns a database error if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                job_id TEXT,
                at TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}'
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_document ON audit_log(document_id)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    /// Append one event row.
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub async fn append(
        &self,
        document_id: &str,
        job_id: Option<&str>,
        actor: &str,
        action: &str,
        details: &Value,
    ) -> StorageResult<()> {
        let raw = serde_json::to_string(details)?;
        sqlx::query(
            r"
            INSERT INTO audit_log (document_id, job_id, at, actor, action, details)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(document_id)
        .bind(job_id)
        .bind(Utc::now().to_rfc3339())
        .bind(actor)
        .bind(action)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List every event for a document, oldest first.
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub async fn list_for_document(&self, document_id: &str) -> StorageResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_log WHERE document_id = ?1 ORDER BY id ASC")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let at_raw: String = row.try_get("at")?;
                let details_raw: String = row.try_get("details")?;
                Ok(AuditLogEntry {
                    id: row.try_get("id")?,
                    document_id: row.try_get("document_id")?,
                    job_id: row.try_get("job_id")?,
                    at: chrono::DateTime::parse_from_rfc3339(&at_raw)
                        .map_err(|e| crate::error::StorageError::invalid_input(e.to_string()))?
                        .with_timezone(&Utc),
                    actor: row.try_get("actor")?,
                    action: row.try_get("action")?,
                    details: serde_json::from_str(&details_raw)?,
                })
            })
            .collect()
    }
}
