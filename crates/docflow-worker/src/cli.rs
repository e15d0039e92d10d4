//! Command-line surface, following the `clap` derive style used throughout
//! the teacher workspace's binary crates (e.g. `zjj`'s CLI).

use std::path::PathBuf;

use clap::Parser;

/// Invoice workflow orchestration worker: runs the HTTP dispatch surface,
/// drains the task broker, and evaluates SLAs on a fixed cadence.
#[derive(Debug, Parser)]
#[command(name = "docflow-worker", version, about)]
pub struct Cli {
    /// SQLite database file (created if missing).
    #[arg(long, env = "DOCFLOW_DATABASE_PATH", default_value = "docflow.sqlite3")]
    pub database_path: PathBuf,

    /// Directory for JSON/Parquet output artifacts.
    #[arg(long, env = "DOCFLOW_OUTPUT_ROOT", default_value = "outputs")]
    pub output_root: PathBuf,

    /// Path to the DAG workflow configuration.
    #[arg(long, env = "DOCFLOW_WORKFLOW_CONFIG", default_value = "configs/workflow.toml")]
    pub workflow_config: PathBuf,

    /// Path to the validation configuration.
    #[arg(long, env = "DOCFLOW_VALIDATION_CONFIG", default_value = "configs/validation.toml")]
    pub validation_config: PathBuf,

    /// Path to the SLA definitions configuration.
    #[arg(long, env = "DOCFLOW_SLA_CONFIG", default_value = "configs/sla.toml")]
    pub sla_config: PathBuf,

    /// Address the HTTP dispatch surface binds to.
    #[arg(long, env = "DOCFLOW_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,
}
