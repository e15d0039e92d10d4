//! `write_outputs` step: builds the canonical extraction payload and writes
//! a JSON copy plus a fixed-schema columnar (Parquet) copy, both via
//! write-to-temp-then-rename for atomicity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use docflow_core::context::WorkflowContext;
use docflow_core::error::{Error, Result as CoreResult};
use docflow_core::registry::Handler;

use crate::llm::INVOICE_FIELDS;

const SCHEMA_VERSION: &str = "1.0.0";

fn content_hash(document_id: &str, file_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b"|");
    hasher.update(file_bytes);
    hex::encode(hasher.finalize())
}

fn build_payload(ctx: &WorkflowContext, hash: &str) -> Value {
    let status = if ctx.needs_review { "review_pending" } else { "completed" };
    json!({
        "schema_version": SCHEMA_VERSION,
        "document_id": ctx.document_id,
        "content_hash": hash,
        "fields": ctx.fields,
        "validation_errors": ctx.validation_errors,
        "status": status,
    })
}

fn field_as_string(fields: &HashMap<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn parquet_schema() -> Schema {
    let mut columns = vec![
        Field::new("document_id", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("schema_version", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("validation_errors", DataType::Utf8, false),
    ];
    for field in INVOICE_FIELDS {
        columns.push(Field::new(field, DataType::Utf8, true));
    }
    Schema::new(columns)
}

fn build_record_batch(ctx: &WorkflowContext, hash: &str, status: &str) -> Result<RecordBatch, Error> {
    let schema = Arc::new(parquet_schema());
    let validation_errors_json = serde_json::to_string(&ctx.validation_errors)
        .unwrap_or_else(|_| "[]".to_string());

    let mut columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(StringArray::from(vec![ctx.document_id.clone()])),
        Arc::new(StringArray::from(vec![hash.to_string()])),
        Arc::new(StringArray::from(vec![SCHEMA_VERSION.to_string()])),
        Arc::new(StringArray::from(vec![status.to_string()])),
        Arc::new(StringArray::from(vec![validation_errors_json])),
    ];

    for field in INVOICE_FIELDS {
        let value = if field == "line_items" {
            match ctx.fields.get(field) {
                Some(v @ Value::Array(_)) => serde_json::to_string(v).unwrap_or_default(),
                _ => String::new(),
            }
        } else {
            field_as_string(&ctx.fields, field)
        };
        columns.push(Arc::new(StringArray::from(vec![value])));
    }

    RecordBatch::try_new(schema, columns)
        .map_err(|e| Error::fatal("write_outputs", format!("record_batch:{e}")))
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::fatal("write_outputs", format!("mkdir:{e}")))?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes).map_err(|e| Error::fatal("write_outputs", format!("write:{e}")))?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::fatal("write_outputs", format!("rename:{e}")))?;
    Ok(())
}

fn write_parquet(ctx: &WorkflowContext, hash: &str, status: &str, path: &Path) -> Result<(), Error> {
    let batch = build_record_batch(ctx, hash, status)?;
    let mut buffer = Vec::new();
    {
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
            .map_err(|e| Error::fatal("write_outputs", format!("parquet_writer:{e}")))?;
        writer
            .write(&batch)
            .map_err(|e| Error::fatal("write_outputs", format!("parquet_write:{e}")))?;
        writer
            .close()
            .map_err(|e| Error::fatal("write_outputs", format!("parquet_close:{e}")))?;
    }
    atomic_write(path, &buffer)
}

/// The `write_outputs` step: sets `ctx.extraction_payload` and
/// `ctx.outputs["json"|"parquet"]`.
pub struct WriteOutputsStep {
    output_root: PathBuf,
}

impl WriteOutputsStep {
    /// Write artifacts under `output_root/json` and `output_root/parquet`.
    #[must_use]
    pub fn new(output_root: PathBuf) -> Self {
        Self { output_root }
    }
}

#[async_trait]
impl Handler for WriteOutputsStep {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let hash = content_hash(&ctx.document_id, &ctx.file_bytes);
        let payload = build_payload(ctx, &hash);
        let status = if ctx.needs_review { "review_pending" } else { "completed" };

        let json_path = self.output_root.join("json").join(format!("{}.json", ctx.document_id));
        let json_bytes = serde_json::to_vec_pretty(&payload)
            .map_err(|e| Error::fatal("write_outputs", format!("json_encode:{e}")))?;
        atomic_write(&json_path, &json_bytes)?;

        let parquet_path = self.output_root.join("parquet").join(format!("{}.parquet", ctx.document_id));
        write_parquet(ctx, &hash, status, &parquet_path)?;

        ctx.outputs.insert("json".to_string(), json_path.display().to_string());
        ctx.outputs.insert("parquet".to_string(), parquet_path.display().to_string());
        ctx.extraction_payload = Some(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_json_and_parquet_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = WorkflowContext::new("job-1", "doc-1", "application/pdf", b"bytes".to_vec());
        ctx.fields.insert("vendor_name".to_string(), Value::from("ACME"));
        ctx.validation_errors = vec![];
        ctx.needs_review = false;

        let step = WriteOutputsStep::new(dir.path().to_path_buf());
        step.run(&mut ctx, &Value::Null).await.expect("runs");

        let json_path = ctx.outputs.get("json").expect("json path recorded");
        let parquet_path = ctx.outputs.get("parquet").expect("parquet path recorded");
        assert!(Path::new(json_path).exists());
        assert!(Path::new(parquet_path).exists());
        assert!(!Path::new(json_path).with_extension("tmp").exists());

        let payload = ctx.extraction_payload.expect("payload set");
        assert_eq!(payload["status"], Value::from("completed"));
        assert_eq!(payload["document_id"], Value::from("doc-1"));
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash("doc-1", b"hello");
        let b = content_hash("doc-1", b"hello");
        let c = content_hash("doc-1", b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
