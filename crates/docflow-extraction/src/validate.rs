//! Schema + confidence-threshold validation (C7) and its step handler.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docflow_core::context::WorkflowContext;
use docflow_core::error::Result as CoreResult;
use docflow_core::registry::Handler;

/// Validation rules, loaded from `configs/validation.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Fields that must be present, non-empty, and not `"UNKNOWN"`.
    pub required_fields: Vec<String>,
    /// Currencies accepted by `currency`.
    pub supported_currencies: HashSet<String>,
    /// Confidence thresholds.
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

/// Confidence threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Threshold applied to a required field with no specific override.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Per-field threshold overrides.
    #[serde(default)]
    pub field_thresholds: HashMap<String, f64>,
}

fn default_threshold() -> f64 {
    0.75
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            field_thresholds: HashMap::new(),
        }
    }
}

impl ValidationConfig {
    fn threshold_for(&self, field: &str) -> f64 {
        self.confidence
            .field_thresholds
            .get(field)
            .copied()
            .unwrap_or(self.confidence.default_threshold)
    }
}

fn present(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() && s != "UNKNOWN" => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => Some(other.to_string()),
    }
}

/// Run schema and confidence checks against extracted `fields`, producing
/// the same error-code vocabulary as the rest of the system
/// (`missing_required:<name>`, `invalid_total_amount`, ...).
#[must_use]
pub fn validate(
    fields: &HashMap<String, Value>,
    field_confidence: &HashMap<String, f64>,
    config: &ValidationConfig,
) -> Vec<String> {
    let mut errors = Vec::new();

    for field in &config.required_fields {
        if present(fields, field).is_none() {
            errors.push(format!("missing_required:{field}"));
        }
    }

    if let Some(raw) = present(fields, "total_amount") {
        match raw.parse::<f64>() {
            Ok(v) if v < 0.0 => errors.push("total_non_negative".to_string()),
            Ok(_) => {}
            Err(_) => errors.push("invalid_total_amount".to_string()),
        }
    }

    if let Some(currency) = present(fields, "currency") {
        if !config.supported_currencies.contains(&currency) {
            errors.push("currency_unsupported".to_string());
        }
    }

    if let Some(raw) = present(fields, "invoice_date") {
        let parses = chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d").is_ok()
            || chrono::DateTime::parse_from_rfc3339(&raw).is_ok();
        if !parses {
            errors.push("invalid_invoice_date".to_string());
        }
    }

    for field in &config.required_fields {
        if present(fields, field).is_none() {
            continue;
        }
        let threshold = config.threshold_for(field);
        let confidence = field_confidence.get(field).copied().unwrap_or(0.0);
        if confidence < threshold {
            errors.push(format!(
                "low_confidence:{field}:{confidence:.2}<{threshold:.2}"
            ));
        }
    }

    errors
}

/// The `validate` step: runs [`validate`] against `ctx.fields` and
/// `ctx.field_confidence`, setting `ctx.needs_review`.
pub struct ValidateStep {
    config: ValidationConfig,
}

impl ValidateStep {
    /// Build the step handler from a loaded [`ValidationConfig`].
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Handler for ValidateStep {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let errors = validate(&ctx.fields, &ctx.field_confidence, &self.config);
        ctx.needs_review = !errors.is_empty();
        ctx.validation_errors = errors;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ValidationConfig {
        ValidationConfig {
            required_fields: vec![
                "invoice_number".to_string(),
                "vendor_name".to_string(),
                "total_amount".to_string(),
                "currency".to_string(),
                "invoice_date".to_string(),
            ],
            supported_currencies: ["USD", "EUR", "GBP", "CHF"].into_iter().map(String::from).collect(),
            confidence: ConfidenceConfig::default(),
        }
    }

    fn full_confidence(fields: &HashMap<String, Value>) -> HashMap<String, f64> {
        fields.keys().map(|k| (k.clone(), 1.0)).collect()
    }

    #[test]
    fn missing_required_field_flagged() {
        let mut fields = HashMap::new();
        fields.insert("invoice_number".to_string(), Value::from(""));
        fields.insert("vendor_name".to_string(), Value::from("V"));
        fields.insert("total_amount".to_string(), Value::from("1"));
        fields.insert("currency".to_string(), Value::from("USD"));
        fields.insert("invoice_date".to_string(), Value::from("2025-01-01"));
        let confidence = full_confidence(&fields);
        let errors = validate(&fields, &confidence, &config());
        assert!(errors.contains(&"missing_required:invoice_number".to_string()));
    }

    #[test]
    fn unsupported_currency_flagged() {
        let mut fields = HashMap::new();
        fields.insert("invoice_number".to_string(), Value::from("INV-1"));
        fields.insert("vendor_name".to_string(), Value::from("V"));
        fields.insert("total_amount".to_string(), Value::from("1"));
        fields.insert("currency".to_string(), Value::from("NGN"));
        fields.insert("invoice_date".to_string(), Value::from("2025-01-01"));
        let confidence = full_confidence(&fields);
        let errors = validate(&fields, &confidence, &config());
        assert!(errors.contains(&"currency_unsupported".to_string()));
    }

    #[test]
    fn low_confidence_formats_values() {
        let mut fields = HashMap::new();
        fields.insert("invoice_number".to_string(), Value::from("INV-1"));
        fields.insert("vendor_name".to_string(), Value::from("V"));
        fields.insert("total_amount".to_string(), Value::from("1"));
        fields.insert("currency".to_string(), Value::from("USD"));
        fields.insert("invoice_date".to_string(), Value::from("2025-01-01"));
        let mut confidence = full_confidence(&fields);
        confidence.insert("vendor_name".to_string(), 0.40);
        let errors = validate(&fields, &confidence, &config());
        assert!(errors.contains(&"low_confidence:vendor_name:0.40<0.75".to_string()));
    }

    #[test]
    fn valid_fields_produce_no_errors() {
        let mut fields = HashMap::new();
        fields.insert("invoice_number".to_string(), Value::from("INV-1"));
        fields.insert("vendor_name".to_string(), Value::from("V"));
        fields.insert("total_amount".to_string(), Value::from("1"));
        fields.insert("currency".to_string(), Value::from("USD"));
        fields.insert("invoice_date".to_string(), Value::from("2025-01-01"));
        let confidence = full_confidence(&fields);
        let errors = validate(&fields, &confidence, &config());
        assert!(errors.is_empty());
    }
}
