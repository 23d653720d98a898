use std::time::Duration;

use common::{storage::types::product_job::DEFAULT_LEASE_SECS, utils::config::AppConfig};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorTuning {
    pub call_timeout: Duration,
    pub item_timeout: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub lease_duration: Duration,
}

impl Default for OrchestratorTuning {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            item_timeout: Duration::from_secs(240),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1_500),
            lease_duration: Duration::from_secs(DEFAULT_LEASE_SECS.unsigned_abs()),
        }
    }
}

impl From<&AppConfig> for OrchestratorTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.external_call_timeout_secs),
            item_timeout: Duration::from_secs(config.item_timeout_secs),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            lease_duration: Duration::from_secs(config.job_lease_secs.unsigned_abs()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tuning: OrchestratorTuning,
    /// Identity written into the lease of every job this instance claims.
    pub worker_id: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tuning: OrchestratorTuning::default(),
            worker_id: format!("orchestrator-{}", Uuid::new_v4()),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: OrchestratorTuning::from(config),
            ..Self::default()
        }
    }
}
