use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use job_pipeline::JobOrchestrator;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
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

    // New jobs start in-process; workers pick up whatever this process drops.
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&db), &config)?);
    let api_state = ApiState::with_resources(db, &config, Some(orchestrator));

    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
