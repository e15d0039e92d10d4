//! Document repository: sqlx/SQLite, following the `AgentRegistry` pattern
//! from `isolate-core::agents::registry` (pool-owning struct, self-managed
//! schema, typed async methods).

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::{StorageError, StorageResult};
use crate::models::{Document, ProcessingStatus};

/// Owns the `documents` table.
#[derive(Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Connect to `pool` and ensure the `documents` table exists.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] if the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                status TEXT NOT NULL,
                received_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                extraction_json TEXT NOT NULL DEFAULT '{}',
                locked_fields TEXT NOT NULL DEFAULT '{}'
            )
            ",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_status_updated ON documents(status, updated_at)",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Create a new document row with status `queued` and a placeholder
    /// content hash (filled in once `write_outputs` runs).
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn create(&self, document_id: &str) -> StorageResult<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO documents (id, content_hash, status, received_at, updated_at, extraction_json, locked_fields)
            VALUES (?1, 'pending', 'queued', ?2, ?2, '{}', '{}')
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(document_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a document by id.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if no row matches, or
    /// [`StorageError::Database`]/[`StorageError::Serialization`] on
    /// underlying failure.
    pub async fn get(&self, document_id: &str) -> StorageResult<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(document_id))?;
        row_to_document(&row)
    }

    /// Set the document's status.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`] on failure.
    pub async fn set_status(&self, document_id: &str, status: ProcessingStatus) -> StorageResult<()> {
        sqlx::query("UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite the document's extraction payload and bump its content
    /// hash/status in one call, matching `persist`'s single write site.
    ///
    /// # Errors
    /// Returns [`StorageError::Database`]/[`StorageError::Serialization`] on
    /// failure.
    pub async fn set_extraction(
        &self,
        document_id: &str,
        content_hash: &str,
        extraction_json: &Value,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(extraction_json)?;
        sqlx::query(
            "UPDATE documents SET extraction_json = ?1, content_hash = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(payload)
        .bind(content_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Monotonically merge human corrections into `locked_fields`: existing
    /// keys are preserved unless `new_fields` supplies a newer value for the
    /// same key, and no key is ever removed (invariant 3). Runs inside a
    /// transaction so concurrent review submissions don't race the merge.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the document doesn't exist, or
    /// a database/serialization error.
    pub async fn merge_locked_fields(
        &self,
        document_id: &str,
        new_fields: &HashMap<String, Value>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT locked_fields FROM documents WHERE id = ?1")
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StorageError::not_found(document_id))?;

        let existing_raw: String = row.try_get("locked_fields")?;
        let mut existing: HashMap<String, Value> =
            serde_json::from_str(&existing_raw).unwrap_or_default();
        existing.extend(new_fields.clone());

        let merged = serde_json::to_string(&existing)?;
        sqlx::query("UPDATE documents SET locked_fields = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(merged)
            .bind(Utc::now().to_rfc3339())
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StorageResult<Document> {
    let status_raw: String = row.try_get("status")?;
    let extraction_raw: String = row.try_get("extraction_json")?;
    let locked_raw: String = row.try_get("locked_fields")?;
    let received_raw: String = row.try_get("received_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Document {
        id: row.try_get("id")?,
        content_hash: row.try_get("content_hash")?,
        status: ProcessingStatus::from_str(&status_raw)?,
        received_at: chrono::DateTime::parse_from_rfc3339(&received_raw)
            .map_err(|e| StorageError::invalid_input(e.to_string()))?
            .with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_raw)
            .map_err(|e| StorageError::invalid_input(e.to_string()))?
            .with_timezone(&Utc),
        extraction_json: serde_json::from_str(&extraction_raw)?,
        locked_fields: serde_json::from_str(&locked_raw)?,
    })
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
    async fn create_and_get_round_trips() {
        let repo = DocumentRepository::new(test_pool().await).await.expect("schema");
        repo.create("doc-1").await.expect("create");
        let doc = repo.get("doc-1").await.expect("fetch");
        assert_eq!(doc.status, ProcessingStatus::Queued);
    }

    #[tokio::test]
    async fn merge_locked_fields_is_monotone() {
        let repo = DocumentRepository::new(test_pool().await).await.expect("schema");
        repo.create("doc-1").await.expect("create");

        let mut first = HashMap::new();
        first.insert("total_amount".to_string(), Value::from(999));
        repo.merge_locked_fields("doc-1", &first).await.expect("merge 1");

        let mut second = HashMap::new();
        second.insert("vendor_name".to_string(), Value::from("ACME"));
        repo.merge_locked_fields("doc-1", &second).await.expect("merge 2");

        let doc = repo.get("doc-1").await.expect("fetch");
        assert_eq!(doc.locked_fields.len(), 2);
        assert_eq!(doc.locked_fields["total_amount"], Value::from(999));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let repo = DocumentRepository::new(test_pool().await).await.expect("schema");
        let err = repo.get("missing").await.expect_err("should 404");
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
