//! Escalation reason classification for the `review_gate` step.

/// Classify a set of validation error codes into a single machine-readable
/// reason, by counting confidence-prefixed errors (`low_confidence:...`)
/// separately from everything else.
#[must_use]
pub fn classify(validation_errors: &[String]) -> &'static str {
    let mut has_confidence = false;
    let mut has_other = false;

    for err in validation_errors {
        if err.starts_with("low_confidence:") {
            has_confidence = true;
        } else {
            has_other = true;
        }
    }

    match (has_other, has_confidence) {
        (true, true) => "validation_failed_and_low_confidence",
        (true, false) => "validation_failed",
        (false, true) => "low_confidence",
        (false, false) => "validation_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_errors_classify_as_combined() {
        let errors = vec![
            "missing_required:currency".to_string(),
            "low_confidence:vendor_name:0.40<0.75".to_string(),
        ];
        assert_eq!(classify(&errors), "validation_failed_and_low_confidence");
    }

    #[test]
    fn only_confidence_errors() {
        let errors = vec!["low_confidence:total_amount:0.50<0.75".to_string()];
        assert_eq!(classify(&errors), "low_confidence");
    }

    #[test]
    fn only_other_errors() {
        let errors = vec!["currency_unsupported".to_string()];
        assert_eq!(classify(&errors), "validation_failed");
    }
}
