//! SLA definition configuration, loaded from `configs/sla.toml`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction in which a value becomes a breach relative to its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Breaches when the value is at or above the threshold (e.g. error rate).
    Lt,
    /// Breaches when the value is at or below the threshold (e.g. throughput).
    Gt,
}

/// One SLA definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaDef {
    /// Metric name, matching a key from `compute_sla_values`.
    pub name: String,
    /// Threshold the metric is compared against.
    pub threshold: f64,
    /// Comparison direction.
    pub comparator: Comparator,
    /// Window expression (`"5m"`, `"1h"`), parsed via [`crate::window::parse_window`].
    pub window: String,
    /// Severity label surfaced to operators.
    pub severity: String,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Errors loading SLA definitions.
#[derive(Debug, Error)]
pub enum SlaConfigError {
    /// The file could not be read or parsed.
    #[error("config_invalid:{0}")]
    Invalid(String),
}

/// Load a list of [`SlaDef`] from a TOML file shaped as `[[definitions]]`.
///
/// # Errors
/// Returns [`SlaConfigError::Invalid`] if the file cannot be read or parsed.
pub fn load_sla_definitions(path: &std::path::Path) -> Result<Vec<SlaDef>, SlaConfigError> {
    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        definitions: Vec<SlaDef>,
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| SlaConfigError::Invalid(format!("{}: {e}", path.display())))?;
    let wrapper: Wrapper =
        toml::from_str(&raw).map_err(|e| SlaConfigError::Invalid(format!("{}: {e}", path.display())))?;
    Ok(wrapper.definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_definitions_from_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
            [[definitions]]
            name = "p95_latency_seconds"
            threshold = 30.0
            comparator = "lt"
            window = "5m"
            severity = "warning"
            "#
        )
        .expect("write");

        let defs = load_sla_definitions(file.path()).expect("parses");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "p95_latency_seconds");
        assert_eq!(defs[0].comparator, Comparator::Lt);
    }
}
