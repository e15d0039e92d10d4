//! Worker binary entrypoint: wires config, storage, the workflow runner,
//! the HTTP dispatch surface, and the SLA evaluation loop together.

mod app;
mod broker;
mod cli;
mod http;
mod metrics;

use std::sync::Arc;

use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docflow_core::config::load_toml;
use docflow_extraction::ValidationConfig;
use docflow_review::ReviewRepository;
use docflow_storage::{AuditRepository, DocumentRepository, JobRepository};

use crate::app::{build_registry, build_runner, process_document, AppState};
use crate::broker::ChannelTaskBroker;
use crate::cli::Cli;
use crate::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let connect_options = SqliteConnectOptions::new().filename(&cli.database_path).create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(connect_options).await?;

    let documents = DocumentRepository::new(pool.clone()).await?;
    let jobs = JobRepository::new(pool.clone()).await?;
    let audit = AuditRepository::new(pool.clone()).await?;
    let review = ReviewRepository::new(pool.clone()).await?;

    let graph = docflow_core::config::load_workflow_graph(&cli.workflow_config)?;
    let validation_config: ValidationConfig = load_toml(&cli.validation_config)?;
    let sla_defs = docflow_sla::load_sla_definitions(&cli.sla_config)?;

    let registry = build_registry(
        documents.clone(),
        jobs.clone(),
        audit.clone(),
        review.clone(),
        validation_config,
        cli.output_root.clone(),
    );
    let runner = Arc::new(build_runner(graph, registry)?);

    let (broker, mut task_rx) = ChannelTaskBroker::new();
    let metrics = Arc::new(Metrics::default());

    let state = AppState {
        documents,
        jobs: jobs.clone(),
        audit,
        review: review.clone(),
        runner,
        metrics,
        broker: Arc::new(broker),
    };

    let worker_state = state.clone();
    tokio::spawn(async move {
        while let Some(task) = task_rx.recv().await {
            process_document(&worker_state, task).await;
        }
    });

    let sla_jobs = Arc::new(jobs);
    let sla_review = Arc::new(review);
    tokio::spawn(docflow_sla::run_evaluation_loop(sla_jobs, sla_review, sla_defs));

    let bind_addr = cli.bind_addr.clone();
    let router = http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "docflow-worker listening");

    if let Err(err) = axum::serve(listener, router).await {
        error!(error = %err, "http server exited");
    }

    Ok(())
}
