//! Structured field extraction contract and step handler (`llm_extract`).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use docflow_core::context::WorkflowContext;
use docflow_core::error::Result as CoreResult;
use docflow_core::registry::Handler;

/// Upper bound on the text handed to the structured extractor.
const MAX_TEXT_CHARS: usize = 20_000;

/// Confidence assigned to any field whose value came from a human-locked
/// override rather than automated extraction.
pub const LOCKED_FIELD_CONFIDENCE: f64 = 0.99;

/// The seven canonical invoice fields this system extracts.
pub const INVOICE_FIELDS: [&str; 7] = [
    "invoice_number",
    "vendor_name",
    "total_amount",
    "currency",
    "invoice_date",
    "tax_amount",
    "line_items",
];

/// Result of one structured extraction call.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Extracted field values, keyed by field name.
    pub fields: HashMap<String, Value>,
    /// Per-field confidence, keyed by field name.
    pub confidence: HashMap<String, f64>,
}

/// External LLM provider contract. Implementations MUST NOT raise on
/// provider failures; they should return the all-null/zero-confidence shape
/// instead so validation (not an exception) drives escalation.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Extract structured invoice fields from OCR `text`.
    async fn extract(&self, text: &str) -> ExtractionResult;
}

/// Deterministic stand-in for a real LLM call, used for local running and
/// tests. Always returns the all-null shape; real extraction quality is
/// outside this crate's concern (see `SPEC_FULL.md` Non-goals).
#[derive(Debug, Default, Clone, Copy)]
pub struct StubStructuredExtractor;

#[async_trait]
impl StructuredExtractor for StubStructuredExtractor {
    async fn extract(&self, _text: &str) -> ExtractionResult {
        let fields = INVOICE_FIELDS
            .iter()
            .map(|&f| (f.to_string(), Value::Null))
            .collect();
        let confidence = INVOICE_FIELDS.iter().map(|&f| (f.to_string(), 0.0)).collect();
        ExtractionResult { fields, confidence }
    }
}

/// The `llm_extract` step: calls the structured extractor, merges locked
/// fields over extracted ones (locked wins), and pins locked-field
/// confidence at [`LOCKED_FIELD_CONFIDENCE`].
pub struct LlmExtractStep<T: StructuredExtractor> {
    extractor: T,
}

impl<T: StructuredExtractor> LlmExtractStep<T> {
    /// Wrap a [`StructuredExtractor`] as a step handler.
    #[must_use]
    pub fn new(extractor: T) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl<T: StructuredExtractor> Handler for LlmExtractStep<T> {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let text = ctx.text.as_deref().unwrap_or("");
        let truncated: String = text.chars().take(MAX_TEXT_CHARS).collect();

        let result = self.extractor.extract(&truncated).await;

        let mut fields = result.fields;
        let mut confidence = result.confidence;

        for (key, value) in &ctx.locked_fields {
            fields.insert(key.clone(), value.clone());
            confidence.insert(key.clone(), LOCKED_FIELD_CONFIDENCE);
        }

        ctx.fields = fields;
        ctx.field_confidence = confidence;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor(ExtractionResult);

    #[async_trait]
    impl StructuredExtractor for FixedExtractor {
        async fn extract(&self, _text: &str) -> ExtractionResult {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn locked_field_overrides_extracted_value() {
        let mut fields = HashMap::new();
        fields.insert("vendor_name".to_string(), Value::from("ACME"));
        fields.insert("total_amount".to_string(), Value::from(100));
        fields.insert("currency".to_string(), Value::from("USD"));
        let mut confidence = HashMap::new();
        confidence.insert("vendor_name".to_string(), 0.8);
        confidence.insert("total_amount".to_string(), 0.8);
        confidence.insert("currency".to_string(), 0.8);

        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        ctx.locked_fields.insert("total_amount".to_string(), Value::from(999));

        let step = LlmExtractStep::new(FixedExtractor(ExtractionResult { fields, confidence }));
        step.run(&mut ctx, &Value::Null).await.expect("runs");

        assert_eq!(ctx.fields["total_amount"], Value::from(999));
        assert_eq!(ctx.fields["vendor_name"], Value::from("ACME"));
        assert_eq!(ctx.field_confidence["total_amount"], LOCKED_FIELD_CONFIDENCE);
        assert_eq!(ctx.field_confidence["vendor_name"], 0.8);
    }
}
