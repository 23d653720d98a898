use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use job_pipeline::{run_worker_loop, JobOrchestrator};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
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

    // Ensure db is initialized
    db.ensure_initialized().await?;

    // API dispatch and the worker loop share one worker id.
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&db), &config)?);
    let api_state =
        ApiState::with_resources(Arc::clone(&db), &config, Some(Arc::clone(&orchestrator)));

    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    info!(worker_id = orchestrator.worker_id(), "Starting worker loop");
    tokio::select! {
        served = axum::serve(listener, app) => {
            if let Err(e) = served {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        worked = run_worker_loop(db, orchestrator) => {
            if let Err(e) = worked {
                error!("Worker process error: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::utils::config::AppConfig;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            openai_api_key: "test-key".into(),
            openai_base_url: "https://example.com".into(),
            printify_api_token: "test-token".into(),
            printify_shop_id: "1".into(),
            printify_base_url: "https://example.com/v1".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("failed to initialize surrealdb");

        let orchestrator = Arc::new(
            JobOrchestrator::new(Arc::clone(&db), &config).expect("failed to build orchestrator"),
        );
        let api_state = ApiState::with_resources(db, &config, Some(orchestrator));

        let app = Router::new()
            .nest("/api/v1", api_routes_v1())
            .with_state(api_state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);
    }
}
