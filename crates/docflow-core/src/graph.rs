//! Dependency graph validation and topological layering (C1).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Declarative specification of one workflow step, as loaded from the DAG
/// configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Registered handler kind, looked up in the [`crate::registry::StepRegistry`].
    pub kind: String,
    /// Names of steps that must complete before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Total attempts (including the first) before a transient failure
    /// becomes fatal. Defaults to 1 (no retry).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Tokens/second for this step's rate limiter, if any.
    #[serde(default)]
    pub rate_limit_rps: Option<f64>,
    /// Burst capacity for this step's rate limiter, if any.
    #[serde(default)]
    pub rate_limit_burst: Option<f64>,
    /// Bounded internal concurrency for steps that fan out (e.g. normalizing
    /// line items). Step-specific; ignored by the runner itself.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_retries() -> u32 {
    1
}

/// A DAG of named steps. Keys are step names, matching `StepSpec` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    steps: BTreeMap<String, StepSpec>,
}

impl WorkflowGraph {
    /// Build a graph from a name→spec map.
    #[must_use]
    pub fn new(steps: BTreeMap<String, StepSpec>) -> Self {
        Self { steps }
    }

    /// Look up a step's spec by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepSpec> {
        self.steps.get(name)
    }

    /// Iterate over all step names, in lexicographic order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Validate that every dependency refers to a known step and the graph
    /// contains no cycle.
    ///
    /// # Errors
    /// Returns [`Error::UnknownDependency`] or [`Error::CycleDetected`].
    pub fn validate(&self) -> Result<()> {
        for (name, spec) in &self.steps {
            for dep in &spec.depends_on {
                if !self.steps.contains_key(dep) {
                    return Err(Error::UnknownDependency(format!("{name}->{dep}")));
                }
            }
        }

        #[derive(PartialEq, Eq, Clone, Copy)]
        enum Mark {
            Visiting,
            Visited,
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        fn visit<'a>(
            name: &'a str,
            steps: &'a BTreeMap<String, StepSpec>,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Visited) => return Ok(()),
                Some(Mark::Visiting) => return Err(Error::CycleDetected),
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(spec) = steps.get(name) {
                for dep in &spec.depends_on {
                    visit(dep.as_str(), steps, marks)?;
                }
            }
            marks.insert(name, Mark::Visited);
            Ok(())
        }

        for name in self.steps.keys() {
            visit(name.as_str(), &self.steps, &mut marks)?;
        }

        Ok(())
    }

    /// Compute topological layers: layer 0 has no dependencies, layer *k+1*
    /// contains every step whose dependencies are all covered by layers
    /// `0..=k`. Step order within a layer is lexicographic.
    ///
    /// # Errors
    /// Returns [`Error::CycleOrMissingNodes`] if the computed layering does
    /// not cover every step (implies a cycle, since `validate` should be
    /// called first to catch other structural issues).
    pub fn topological_layers(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining_deps: BTreeMap<&str, BTreeSet<&str>> = self
            .steps
            .iter()
            .map(|(name, spec)| {
                (
                    name.as_str(),
                    spec.depends_on.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut layers = Vec::new();
        let mut placed: BTreeSet<&str> = BTreeSet::new();

        while placed.len() < self.steps.len() {
            let mut ready: Vec<&str> = remaining_deps
                .iter()
                .filter(|(name, deps)| !placed.contains(*name) && deps.is_empty())
                .map(|(name, _)| *name)
                .collect();
            ready.sort_unstable();

            if ready.is_empty() {
                return Err(Error::CycleOrMissingNodes);
            }

            for name in &ready {
                placed.insert(name);
                remaining_deps.remove(name);
            }
            for deps in remaining_deps.values_mut() {
                for name in &ready {
                    deps.remove(name);
                }
            }

            layers.push(ready.into_iter().map(str::to_owned).collect());
        }

        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(depends_on: &[&str]) -> StepSpec {
        StepSpec {
            kind: "noop".to_string(),
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            retries: 1,
            rate_limit_rps: None,
            rate_limit_burst: None,
            max_concurrency: None,
        }
    }

    #[test]
    fn diamond_layers_in_order() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec(&[]));
        steps.insert("b".to_string(), spec(&["a"]));
        steps.insert("c".to_string(), spec(&["a"]));
        steps.insert("d".to_string(), spec(&["b", "c"]));
        let graph = WorkflowGraph::new(steps);
        graph.validate().expect("valid graph");
        let layers = graph.topological_layers().expect("layered");
        assert_eq!(
            layers,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn detects_cycle() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec(&["b"]));
        steps.insert("b".to_string(), spec(&["a"]));
        let graph = WorkflowGraph::new(steps);
        let err = graph.validate().expect_err("cycle should be rejected");
        assert!(matches!(err, Error::CycleDetected));
    }

    #[test]
    fn detects_unknown_dependency() {
        let mut steps = BTreeMap::new();
        steps.insert("a".to_string(), spec(&["missing"]));
        let graph = WorkflowGraph::new(steps);
        let err = graph.validate().expect_err("unknown dep should be rejected");
        assert!(matches!(err, Error::UnknownDependency(_)));
    }

    #[test]
    fn covers_every_step() {
        let mut steps = BTreeMap::new();
        for name in ["a", "b", "c"] {
            steps.insert(name.to_string(), spec(&[]));
        }
        let graph = WorkflowGraph::new(steps);
        let layers = graph.topological_layers().expect("layered");
        let total: usize = layers.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert_eq!(layers.len(), 1);
    }
}
