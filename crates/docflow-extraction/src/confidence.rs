//! Per-field confidence heuristics (C7). The LLM extractor does not return
//! calibrated confidence, so these rules approximate it from shape and
//! cross-referencing against the raw OCR text.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn invoice_number_strict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9\-/]{3,20}$").expect("static pattern"))
}

#[allow(clippy::expect_used)]
fn invoice_number_loose() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{2,30}$").expect("static pattern"))
}

#[allow(clippy::expect_used)]
fn currency_strict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("static pattern"))
}

#[allow(clippy::expect_used)]
fn date_strict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"))
}

fn as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_empty_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "UNKNOWN",
        _ => false,
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '\u{20AC}' | '\u{A3}'))
        .collect();
    cleaned.trim().parse::<f64>().ok()
}

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 0.99)
}

/// Compute the confidence score for one field, given its extracted value
/// and the raw OCR text (used for substring cross-checks).
#[must_use]
pub fn compute_field_confidence(field_name: &str, value: &Value, ocr_text: &str) -> f64 {
    if is_empty_like(value) {
        return 0.0;
    }

    let Some(raw) = as_str(value) else {
        return clamp(0.5);
    };

    let score = match field_name {
        "invoice_number" => {
            let upper = raw.to_uppercase();
            let base = if invoice_number_strict().is_match(&upper) {
                0.85
            } else if invoice_number_loose().is_match(&upper) {
                0.75
            } else {
                0.5
            };
            bump_if_present(base, &raw, ocr_text, 0.10, 0.95)
        }
        "vendor_name" => {
            let len_ok = (2..=50).contains(&raw.chars().count());
            let not_all_digits = !raw.chars().all(|c| c.is_ascii_digit());
            let base = if len_ok && not_all_digits { 0.80 } else { 0.5 };
            bump_if_present(base, &raw, ocr_text, 0.10, 0.90)
        }
        "total_amount" => match parse_amount(&raw) {
            Some(v) if v > 0.0 => 0.90,
            Some(v) if v == 0.0 => 0.70,
            Some(_) => 0.30,
            None => 0.40,
        },
        "currency" => {
            let upper = raw.to_uppercase();
            if currency_strict().is_match(&upper) {
                0.95
            } else if upper.chars().count() == 3 {
                0.80
            } else {
                0.5
            }
        }
        "invoice_date" => {
            if date_strict().is_match(&raw) && chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d").is_ok() {
                0.90
            } else if chrono::DateTime::parse_from_rfc3339(&raw).is_ok() {
                0.75
            } else {
                0.40
            }
        }
        "tax_amount" => match parse_amount(&raw) {
            Some(v) if v >= 0.0 => 0.80,
            Some(_) => 0.30,
            None => 0.50,
        },
        "line_items" => match value {
            Value::Array(items) if !items.is_empty() => 0.75,
            _ => 0.50,
        },
        _ => 0.5,
    };

    clamp(score)
}

fn bump_if_present(base: f64, value: &str, ocr_text: &str, bump: f64, cap: f64) -> f64 {
    if !value.is_empty() && ocr_text.to_lowercase().contains(&value.to_lowercase()) {
        (base + bump).min(cap)
    } else {
        base
    }
}

/// Compute confidence for every field in `fields`.
#[must_use]
pub fn compute_all_confidence(
    fields: &std::collections::HashMap<String, Value>,
    ocr_text: &str,
) -> std::collections::HashMap<String, f64> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), compute_field_confidence(k, v, ocr_text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_strict_pattern_scores_high() {
        let score = compute_field_confidence("invoice_number", &Value::from("INV-2024-001"), "");
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn empty_value_scores_zero() {
        let score = compute_field_confidence("vendor_name", &Value::from(""), "");
        assert_eq!(score, 0.0);
        let score = compute_field_confidence("vendor_name", &Value::from("UNKNOWN"), "");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn total_amount_negative_scores_low() {
        let score = compute_field_confidence("total_amount", &Value::from("-10.00"), "");
        assert!((score - 0.30).abs() < 1e-9);
    }

    #[test]
    fn substring_presence_bumps_score() {
        let without = compute_field_confidence("vendor_name", &Value::from("Acme Corp"), "");
        let with = compute_field_confidence("vendor_name", &Value::from("Acme Corp"), "invoice from acme corp today");
        assert!(with > without);
    }

    #[test]
    fn scores_never_exceed_cap() {
        let score = compute_field_confidence(
            "invoice_number",
            &Value::from("ABC-123"),
            "reference ABC-123 enclosed",
        );
        assert!(score <= 0.99);
    }
}
