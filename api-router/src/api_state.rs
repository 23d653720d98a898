use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use job_pipeline::JobOrchestrator;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    /// In-process runner for freshly created jobs. Without one, jobs wait
    /// in `queued` for a worker to claim them.
    pub orchestrator: Option<Arc<JobOrchestrator>>,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        orchestrator: Option<Arc<JobOrchestrator>>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        Ok(Self::with_resources(surreal_db_client, config, orchestrator))
    }

    pub fn with_resources(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        orchestrator: Option<Arc<JobOrchestrator>>,
    ) -> Self {
        Self {
            db,
            config: config.clone(),
            orchestrator,
        }
    }

    /// Starts the job in the background. The request never waits on it.
    pub fn dispatch(&self, job_id: &str) {
        let Some(orchestrator) = self.orchestrator.clone() else {
            debug!(%job_id, "no in-process orchestrator; leaving job for workers");
            return;
        };

        let job_id = job_id.to_string();
        tokio::spawn(async move {
            match orchestrator.run_job(&job_id).await {
                Ok(Some(job)) => info!(
                    %job_id,
                    status = job.status.as_str(),
                    completed = job.completed,
                    failed = job.failed,
                    "dispatched job finished"
                ),
                Ok(None) => debug!(%job_id, "dispatched job was claimed elsewhere"),
                Err(err) => error!(%job_id, error = %err, "dispatched job stopped with an error"),
            }
        });
    }
}
