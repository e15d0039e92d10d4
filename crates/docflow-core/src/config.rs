//! Layered TOML configuration loading, following the hierarchy style used
//! throughout the teacher workspace's `isolate-core::config` module:
//! built-in defaults, then an on-disk file, then environment overrides.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::graph::{StepSpec, WorkflowGraph};

/// Load a `WorkflowGraph` from a TOML file shaped as a table of step
/// name → [`StepSpec`].
///
/// # Errors
/// Returns [`Error::ConfigInvalid`] if the file cannot be read or parsed.
pub fn load_workflow_graph(path: &Path) -> Result<WorkflowGraph> {
    let steps: BTreeMap<String, StepSpec> = load_toml(path)?;
    Ok(WorkflowGraph::new(steps))
}

/// Generic TOML loader used by every config kind in this workspace (DAG,
/// validation, SLA). Centralizing this keeps the read-parse-wrap-error
/// pattern in one place instead of duplicating it per config type.
///
/// # Errors
/// Returns [`Error::ConfigInvalid`] if the file cannot be read or its
/// contents don't parse as `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::ConfigInvalid(format!("{}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| Error::ConfigInvalid(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_workflow_graph_from_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
            [a]
            kind = "noop"

            [b]
            kind = "noop"
            depends_on = ["a"]
            retries = 3
            "#
        )
        .expect("write");

        let graph = load_workflow_graph(file.path()).expect("parses");
        graph.validate().expect("valid");
        assert_eq!(graph.get("b").expect("present").retries, 3);
    }

    #[test]
    fn missing_file_is_config_invalid() {
        let err = load_workflow_graph(Path::new("/nonexistent/path.toml"))
            .expect_err("should fail");
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }
}
