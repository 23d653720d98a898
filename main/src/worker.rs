use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::get_config};
use job_pipeline::{run_worker_loop, JobOrchestrator};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&db), &config)?);
    info!(worker_id = orchestrator.worker_id(), "Starting worker process");

    run_worker_loop(db, orchestrator).await
}
