//! OCR text extraction contract and step handler.

use async_trait::async_trait;
use serde_json::Value;

use docflow_core::context::WorkflowContext;
use docflow_core::error::Result as CoreResult;
use docflow_core::registry::Handler;

/// External OCR provider contract. Implementations MUST NOT raise on
/// transient provider failures; they should return an empty string so the
/// pipeline can still escalate the document to human review.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw text from `bytes` of the given `content_type`.
    async fn extract_text(&self, bytes: &[u8], content_type: &str) -> String;
}

/// Deterministic stand-in for a cloud document-AI provider, used for local
/// running and tests. Decodes `bytes` as UTF-8 lossily; real
/// implementations would call out to a Textract/Document-AI-style service.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubTextExtractor;

#[async_trait]
impl TextExtractor for StubTextExtractor {
    async fn extract_text(&self, bytes: &[u8], _content_type: &str) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// The `ocr` step: reads `ctx.file_bytes`/`ctx.content_type`, writes
/// `ctx.text`.
pub struct OcrStep<T: TextExtractor> {
    extractor: T,
}

impl<T: TextExtractor> OcrStep<T> {
    /// Wrap a [`TextExtractor`] as a step handler.
    #[must_use]
    pub fn new(extractor: T) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl<T: TextExtractor> Handler for OcrStep<T> {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let text = self.extractor.extract_text(&ctx.file_bytes, &ctx.content_type).await;
        ctx.text = Some(text);
        Ok(())
    }
}
