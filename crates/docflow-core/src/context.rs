//! Mutable per-run state shared across steps (C4).

use std::collections::HashMap;

use serde_json::Value;

/// Owned state threaded through one workflow run. Steps read whatever
/// fields they need and write only the fields they own; peer steps within
/// the same DAG layer must never write the same field.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Task identifier for this processing attempt.
    pub job_id: String,
    /// Document identifier being processed.
    pub document_id: String,
    /// MIME type of the source bytes.
    pub content_type: String,
    /// Raw source bytes.
    pub file_bytes: Vec<u8>,
    /// Human-pinned field values, loaded from the document at run start.
    /// Never overwritten by automated extraction.
    pub locked_fields: HashMap<String, Value>,

    /// OCR output, set by the `ocr` step.
    pub text: Option<String>,
    /// Extracted field values, set by `llm_extract`, refined by
    /// `normalize_line_items`.
    pub fields: HashMap<String, Value>,
    /// Per-field confidence in `[0.0, 1.0]`, set by `llm_extract`.
    pub field_confidence: HashMap<String, f64>,
    /// Validation error codes, set by `validate`.
    pub validation_errors: Vec<String>,
    /// Paths of artifacts written by `write_outputs`.
    pub outputs: HashMap<String, String>,
    /// Whether this run requires a human review item, set by `validate`.
    pub needs_review: bool,
    /// The final payload persisted and written to disk.
    pub extraction_payload: Option<Value>,
}

impl WorkflowContext {
    /// Start a fresh context for one processing attempt.
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        document_id: impl Into<String>,
        content_type: impl Into<String>,
        file_bytes: Vec<u8>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            document_id: document_id.into(),
            content_type: content_type.into(),
            file_bytes,
            locked_fields: HashMap::new(),
            text: None,
            fields: HashMap::new(),
            field_confidence: HashMap::new(),
            validation_errors: Vec::new(),
            outputs: HashMap::new(),
            needs_review: false,
            extraction_payload: None,
        }
    }

    /// Attach locked fields loaded from the document record.
    #[must_use]
    pub fn with_locked_fields(mut self, locked: HashMap<String, Value>) -> Self {
        self.locked_fields = locked;
        self
    }
}
