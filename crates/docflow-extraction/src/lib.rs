//! OCR → LLM extract → normalize → validate → write-outputs → persist →
//! review-gate step handlers (C6), plus the confidence and validation
//! services that back them (C7).

pub mod confidence;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod persist;
pub mod review_gate;
pub mod validate;
pub mod write_outputs;

pub use confidence::{compute_all_confidence, compute_field_confidence};
pub use llm::{ExtractionResult, LlmExtractStep, StructuredExtractor, StubStructuredExtractor, INVOICE_FIELDS};
pub use normalize::NormalizeLineItemsStep;
pub use ocr::{OcrStep, StubTextExtractor, TextExtractor};
pub use persist::PersistStep;
pub use review_gate::ReviewGateStep;
pub use validate::{ConfidenceConfig, ValidateStep, ValidationConfig};
pub use write_outputs::WriteOutputsStep;
