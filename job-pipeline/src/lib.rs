#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod clients;
pub mod content;
pub mod pipeline;
pub mod retry;
pub mod selection;
pub mod types;
pub mod utils;

use chrono::Utc;
use common::storage::{db::SurrealDbClient, types::product_job::ProductJob};
pub use pipeline::{Capabilities, JobOrchestrator, OrchestratorConfig, OrchestratorTuning};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Claims queued or abandoned jobs one at a time, forever.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    orchestrator: Arc<JobOrchestrator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = orchestrator.worker_id().to_string();
    let lease_duration = orchestrator.lease_duration();
    let idle_backoff = Duration::from_millis(500);

    loop {
        match ProductJob::claim_next_ready(&db, &worker_id, Utc::now(), lease_duration).await {
            Ok(Some(job)) => {
                let job_id = job.id.clone();
                info!(
                    %worker_id,
                    %job_id,
                    next_index = job.next_index,
                    total = job.total,
                    "claimed product job"
                );
                match orchestrator.process_claimed(job).await {
                    Ok(finished) => info!(
                        %worker_id,
                        %job_id,
                        status = finished.status.as_str(),
                        "product job settled"
                    ),
                    Err(err) => error!(%worker_id, %job_id, error = %err, "product job failed"),
                }
            }
            Ok(None) => {
                sleep(idle_backoff).await;
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim product job");
                warn!("Backing off for 1s after claim error");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
