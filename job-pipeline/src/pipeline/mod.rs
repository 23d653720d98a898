mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{OrchestratorConfig, OrchestratorTuning};
pub use services::{
    Capabilities, CatalogLookup, ContentGenerator, ImageProducer, ImageUploader, ProductCreator,
    Publisher,
};
pub use stages::{failure_message, generation_prompt};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            job_params::{ImageMode, JobParams},
            product_job::{ItemResult, ItemStatus, ItemStep, JobStatus, ProductJob},
        },
    },
    utils::{config::AppConfig, sanitize::sanitize_error},
};
use tracing::{debug, error, info, warn};

use crate::{clients::default_capabilities, retry::RetryPolicy};

use self::{
    context::ItemContext,
    stages::{
        create_product, keep_created_after_timeout, prepare_image, resolve_blueprint,
        resolve_print_area, resolve_provider, settle, upload_image, write_content, ITEM_TIMED_OUT,
    },
    state::{ready, ItemMachine, ProductCreated},
};

/// Runs product jobs item by item against the capability clients.
pub struct JobOrchestrator {
    db: Arc<SurrealDbClient>,
    config: OrchestratorConfig,
    capabilities: Capabilities,
    retry: RetryPolicy,
}

impl JobOrchestrator {
    /// Wires the HTTP clients described by `config`.
    pub fn new(db: Arc<SurrealDbClient>, config: &AppConfig) -> Result<Self, AppError> {
        let capabilities = default_capabilities(config)?;
        Ok(Self::with_capabilities(
            db,
            OrchestratorConfig::from_app_config(config),
            capabilities,
        ))
    }

    pub fn with_capabilities(
        db: Arc<SurrealDbClient>,
        config: OrchestratorConfig,
        capabilities: Capabilities,
    ) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.tuning.retry_attempts,
            delay: config.tuning.retry_delay,
            ..RetryPolicy::default()
        };
        Self {
            db,
            config,
            capabilities,
            retry,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn lease_duration(&self) -> Duration {
        self.config.tuning.lease_duration
    }

    /// Claims `job_id` and drives it to a terminal state. Returns `None`
    /// when the job is finished already or leased by another worker.
    #[tracing::instrument(skip_all, fields(job_id = %job_id, worker_id = %self.config.worker_id))]
    pub async fn run_job(&self, job_id: &str) -> Result<Option<ProductJob>, AppError> {
        let claimed = ProductJob::claim(
            job_id,
            &self.db,
            &self.config.worker_id,
            Utc::now(),
            self.lease_duration(),
        )
        .await?;

        match claimed {
            Some(job) => self.process_claimed(job).await.map(Some),
            None => {
                debug!(job_id, "job not claimable; skipping");
                Ok(None)
            }
        }
    }

    /// Drives a job this instance already holds the lease on.
    #[tracing::instrument(
        skip_all,
        fields(job_id = %job.id, worker_id = %self.config.worker_id, total = job.total)
    )]
    pub async fn process_claimed(&self, job: ProductJob) -> Result<ProductJob, AppError> {
        let job_id = job.id.clone();

        let mut job = match job.status {
            JobStatus::Queued => match job.mark_in_progress(&self.db).await? {
                Some(started) => started,
                None => return ProductJob::get(&job_id, &self.db).await,
            },
            JobStatus::InProgress => job,
            _ => return Ok(job),
        };

        if let Err(reason) = check_runnable(&job.params) {
            warn!(%job_id, %reason, "job cannot start");
            return match job.mark_failed(reason, &self.db).await? {
                Some(failed) => Ok(failed),
                None => ProductJob::get(&job_id, &self.db).await,
            };
        }

        info!(
            %job_id,
            total = job.total,
            next_index = job.next_index,
            "job running"
        );
        let started = Instant::now();

        while job.next_index < job.total {
            let status = ProductJob::current_status(&job_id, &self.db).await?;
            if status != JobStatus::InProgress {
                info!(%job_id, status = status.as_str(), next_index = job.next_index, "job stopped between items");
                return ProductJob::get(&job_id, &self.db).await;
            }

            let position = job.next_index;
            let result = self.process_item(&mut job, position).await;

            if result.is_success() {
                job.completed = job.completed.saturating_add(1);
            } else {
                job.failed = job.failed.saturating_add(1);
            }
            job.upsert_result(result);
            job.next_index = position.saturating_add(1);
            job.record_item_outcome(&self.db).await.map_err(|err| {
                error!(%job_id, position, error = %err, "failed to persist item outcome");
                err
            })?;
        }

        let finished = match job.finish(&self.db).await? {
            Some(finished) => finished,
            None => ProductJob::get(&job_id, &self.db).await?,
        };

        info!(
            %job_id,
            status = finished.status.as_str(),
            completed = finished.completed,
            failed = finished.failed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job finished"
        );

        Ok(finished)
    }

    /// Runs every step of one item. Failures stay on the returned result;
    /// they never abort the job.
    async fn process_item(&self, job: &mut ProductJob, position: u32) -> ItemResult {
        let mut ctx = ItemContext::new(
            job,
            self.db.as_ref(),
            &self.config.tuning,
            &self.capabilities,
            &self.retry,
            position,
        );

        // The budget covers everything up to product creation. Pricing and
        // publishing run after it, each bounded by the per-call timeout.
        let item_timeout = self.config.tuning.item_timeout;
        let outcome = tokio::time::timeout(item_timeout, drive_item(&mut ctx)).await;

        let failure = match outcome {
            Ok(Ok(machine)) => {
                if let Err(err) = settle(machine, &mut ctx).await {
                    warn!(
                        job_id = %ctx.job_id,
                        index = ctx.index(),
                        error = %err,
                        "failed to record pricing or publish progress"
                    );
                }
                None
            }
            Ok(Err(err)) => {
                let err = ctx.abort(err);
                Some((failure_message(ctx.step), err.to_string()))
            }
            Err(_) if ctx.item.product_id.is_some() => {
                warn!(
                    job_id = %ctx.job_id,
                    index = ctx.index(),
                    timeout_secs = item_timeout.as_secs(),
                    "item timed out after its product was created"
                );
                keep_created_after_timeout(&mut ctx);
                None
            }
            Err(_) => {
                warn!(
                    job_id = %ctx.job_id,
                    index = ctx.index(),
                    step = ctx.step.as_str(),
                    timeout_secs = item_timeout.as_secs(),
                    "item timed out"
                );
                let err = AppError::Timeout(format!(
                    "item exceeded {}s while at {}",
                    item_timeout.as_secs(),
                    ctx.step.as_str()
                ));
                Some((ITEM_TIMED_OUT, err.to_string()))
            }
        };

        let mut item = ctx.item;
        if let Some((message, reason)) = failure {
            item.status = ItemStatus::Failed;
            item.step = ItemStep::Error;
            item.message = message.to_string();
            item.error = Some(sanitize_error(&reason));
        } else {
            info!(
                job_id = %ctx.job_id,
                index = item.index,
                status = ?item.status,
                "item finished"
            );
        }
        item
    }
}

/// Steps up to and including product creation.
async fn drive_item(
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ProductCreated>, AppError> {
    ctx.advance(ItemStep::Started, "processing started").await?;

    let machine = ready();
    let machine = resolve_blueprint(machine, ctx).await?;
    let machine = resolve_provider(machine, ctx).await?;
    let machine = resolve_print_area(machine, ctx).await?;
    let machine = prepare_image(machine, ctx).await?;
    let machine = upload_image(machine, ctx).await?;
    let machine = write_content(machine, ctx).await?;
    create_product(machine, ctx).await
}

/// Parameters that make every item fail the same way are a job-level failure.
fn check_runnable(params: &JobParams) -> Result<(), String> {
    if params.image_mode == ImageMode::Upload && params.image_urls.is_empty() {
        return Err("upload mode requires at least one image url".into());
    }
    Ok(())
}
