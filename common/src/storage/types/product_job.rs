use std::time::Duration;

use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{
    job_params::JobParams,
    surreal_serde::{deserialize_option_datetime, serialize_option_datetime},
};

pub const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Created,
    Published,
    Failed,
}

/// Pipeline stage an item last reached.
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStep {
    #[default]
    Started,
    Blueprint,
    Provider,
    PrintAreas,
    ImageReady,
    ImageUploaded,
    ContentReady,
    ProductCreated,
    Published,
    Error,
}

impl ItemStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStep::Started => "started",
            ItemStep::Blueprint => "blueprint",
            ItemStep::Provider => "provider",
            ItemStep::PrintAreas => "print-areas",
            ItemStep::ImageReady => "image-ready",
            ItemStep::ImageUploaded => "image-uploaded",
            ItemStep::ContentReady => "content-ready",
            ItemStep::ProductCreated => "product-created",
            ItemStep::Published => "published",
            ItemStep::Error => "error",
        }
    }
}

/// Progress and outcome of one item, replaced by index as the item advances.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ItemResult {
    /// 1-based position within the job.
    pub index: u32,
    pub step: ItemStep,
    pub status: ItemStatus,
    pub message: String,
    pub image_url: Option<String>,
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
    /// Set when the product exists but still carries its placeholder price.
    #[serde(default)]
    pub pricing_error: Option<String>,
    pub publish_error: Option<String>,
}

impl ItemResult {
    pub fn pending(index: u32) -> Self {
        Self {
            index,
            message: "queued for processing".to_string(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Created | ItemStatus::Published)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Start,
    Complete,
    Fail,
    Cancel,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Start => "start",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
            JobTransition::Cancel => "cancel",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Queued,
        states: [Queued, InProgress, Completed, Failed, Cancelled],
        events {
            start {
                transition: { from: Queued, to: InProgress }
            }
            complete {
                transition: { from: InProgress, to: Completed }
            }
            fail {
                transition: { from: Queued, to: Failed }
                transition: { from: InProgress, to: Failed }
            }
            cancel {
                transition: { from: Queued, to: Cancelled }
                transition: { from: InProgress, to: Cancelled }
            }
        }
    }

    pub(super) fn queued() -> JobLifecycleMachine<(), Queued> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn in_progress() -> JobLifecycleMachine<(), InProgress> {
        queued()
            .start()
            .expect("start transition from Queued should exist")
    }
}

fn invalid_transition(status: &JobStatus, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

fn compute_next_status(status: &JobStatus, event: JobTransition) -> Result<JobStatus, AppError> {
    use lifecycle::*;
    match (status, event) {
        (JobStatus::Queued, JobTransition::Start) => queued()
            .start()
            .map(|_| JobStatus::InProgress)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::InProgress, JobTransition::Complete) => in_progress()
            .complete()
            .map(|_| JobStatus::Completed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Queued, JobTransition::Fail) => queued()
            .fail()
            .map(|_| JobStatus::Failed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::InProgress, JobTransition::Fail) => in_progress()
            .fail()
            .map(|_| JobStatus::Failed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Queued, JobTransition::Cancel) => queued()
            .cancel()
            .map(|_| JobStatus::Cancelled)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::InProgress, JobTransition::Cancel) => in_progress()
            .cancel()
            .map(|_| JobStatus::Cancelled)
            .map_err(|_| invalid_transition(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

stored_object!(ProductJob, "product_job", {
    owner_ref: String,
    params: JobParams,
    status: JobStatus,
    total: u32,
    completed: u32,
    failed: u32,
    next_index: u32,
    results: Vec<ItemResult>,
    error_message: Option<String>,
    worker_id: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    locked_at: Option<chrono::DateTime<chrono::Utc>>,
    lease_duration_secs: i64
});

impl ProductJob {
    pub fn new(params: JobParams, total: u32, owner_ref: String) -> Self {
        let now = chrono::Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            owner_ref,
            params,
            status: JobStatus::Queued,
            total,
            completed: 0,
            failed: 0,
            next_index: 0,
            results: Vec::new(),
            error_message: None,
            worker_id: None,
            locked_at: None,
            lease_duration_secs: DEFAULT_LEASE_SECS,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create_and_add_to_db(
        params: JobParams,
        total: u32,
        owner_ref: String,
        db: &SurrealDbClient,
    ) -> Result<ProductJob, AppError> {
        let job = Self::new(params, total, owner_ref);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<ProductJob, AppError> {
        db.get_item::<ProductJob>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))
    }

    pub async fn list_for_owner(
        owner_ref: &str,
        limit: u32,
        db: &SurrealDbClient,
    ) -> Result<Vec<ProductJob>, AppError> {
        let jobs: Vec<ProductJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE owner_ref = $owner_ref
                 ORDER BY created_at DESC
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("owner_ref", owner_ref.to_string()))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(jobs)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.lease_duration_secs).unwrap_or(0))
    }

    /// Replaces the entry with the same index, or appends it in index order.
    pub fn upsert_result(&mut self, result: ItemResult) {
        if let Some(existing) = self.results.iter_mut().find(|r| r.index == result.index) {
            *existing = result;
            return;
        }
        self.results.push(result);
        self.results.sort_by_key(|r| r.index);
    }

    pub fn counters_consistent(&self) -> bool {
        self.completed.saturating_add(self.failed) <= self.total
    }

    fn active_states() -> Vec<&'static str> {
        vec![JobStatus::Queued.as_str(), JobStatus::InProgress.as_str()]
    }

    /// Takes ownership of a specific job. Returns `None` when the job is no
    /// longer active or another worker holds an unexpired lease on it.
    pub async fn claim(
        id: &str,
        db: &SurrealDbClient,
        worker_id: &str,
        now: chrono::DateTime<chrono::Utc>,
        lease_duration: Duration,
    ) -> Result<Option<ProductJob>, AppError> {
        const CLAIM_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET worker_id = $worker_id,
                locked_at = $now,
                lease_duration_secs = $lease_secs,
                updated_at = $now
            WHERE status IN $active_states
              AND (
                    locked_at = NONE
                    OR worker_id = $worker_id
                    OR time::unix($now) - time::unix(locked_at) >= lease_duration_secs
              )
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("active_states", Self::active_states()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("lease_secs", lease_secs(lease_duration)))
            .await?;

        let job: Option<ProductJob> = result.take(0)?;
        Ok(job)
    }

    /// Claims the oldest active job that nobody holds a live lease on.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        worker_id: &str,
        now: chrono::DateTime<chrono::Utc>,
        lease_duration: Duration,
    ) -> Result<Option<ProductJob>, AppError> {
        const CLAIM_NEXT_QUERY: &str = r#"
            UPDATE (
                SELECT * FROM type::table($table)
                WHERE status IN $active_states
                  AND (
                        locked_at = NONE
                        OR time::unix($now) - time::unix(locked_at) >= lease_duration_secs
                  )
                ORDER BY created_at ASC
                LIMIT 1
            )
            SET worker_id = $worker_id,
                locked_at = $now,
                lease_duration_secs = $lease_secs,
                updated_at = $now
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(CLAIM_NEXT_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("active_states", Self::active_states()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("lease_secs", lease_secs(lease_duration)))
            .await?;

        let job: Option<ProductJob> = result.take(0)?;
        Ok(job)
    }

    async fn transition(
        &self,
        event: JobTransition,
        allowed: Vec<&'static str>,
        error_message: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Option<ProductJob>, AppError> {
        let next = compute_next_status(&self.status, event)?;

        const TRANSITION_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                error_message = $error_message,
                worker_id = IF $release THEN NONE ELSE worker_id END,
                locked_at = IF $release THEN NONE ELSE locked_at END,
                updated_at = $now
            WHERE status IN $allowed
            RETURN AFTER;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(TRANSITION_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("next", next.as_str()))
            .bind(("error_message", error_message.or_else(|| self.error_message.clone())))
            .bind(("release", next.is_terminal()))
            .bind(("allowed", allowed))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ProductJob> = result.take(0)?;
        Ok(updated)
    }

    /// `queued -> in_progress`. `None` means the stored job left `queued`
    /// in the meantime (typically a cancel).
    pub async fn mark_in_progress(
        &self,
        db: &SurrealDbClient,
    ) -> Result<Option<ProductJob>, AppError> {
        self.transition(
            JobTransition::Start,
            vec![JobStatus::Queued.as_str()],
            None,
            db,
        )
        .await
    }

    /// Resolves an in-progress job: `failed` when nothing succeeded,
    /// `completed` otherwise (including `total = 0`).
    pub async fn finish(&self, db: &SurrealDbClient) -> Result<Option<ProductJob>, AppError> {
        let event = if self.total > 0 && self.completed == 0 {
            JobTransition::Fail
        } else {
            JobTransition::Complete
        };
        self.transition(event, vec![JobStatus::InProgress.as_str()], None, db)
            .await
    }

    /// Job-level failure before or outside the item loop.
    pub async fn mark_failed(
        &self,
        message: String,
        db: &SurrealDbClient,
    ) -> Result<Option<ProductJob>, AppError> {
        self.transition(JobTransition::Fail, Self::active_states(), Some(message), db)
            .await
    }

    /// Flags a job as cancelled unless it already reached a terminal state,
    /// returning the latest snapshot either way.
    pub async fn cancel(id: &str, db: &SurrealDbClient) -> Result<ProductJob, AppError> {
        let job = Self::get(id, db).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        match job
            .transition(JobTransition::Cancel, Self::active_states(), None, db)
            .await?
        {
            Some(cancelled) => Ok(cancelled),
            None => Self::get(id, db).await,
        }
    }

    /// Re-reads the persisted status, which other requests may have changed.
    pub async fn current_status(id: &str, db: &SurrealDbClient) -> Result<JobStatus, AppError> {
        Ok(Self::get(id, db).await?.status)
    }

    /// Persists the results array and refreshes the lease heartbeat.
    pub async fn save_results(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        const SAVE_RESULTS_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET results = $results,
                locked_at = $now,
                updated_at = $now
            RETURN AFTER;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(SAVE_RESULTS_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("results", self.results.clone()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ProductJob> = result.take(0)?;
        let updated = updated.ok_or_else(|| AppError::NotFound(format!("job {} not found", self.id)))?;
        self.updated_at = updated.updated_at;
        self.locked_at = updated.locked_at;
        Ok(())
    }

    /// Persists the finished item together with counters and the cursor.
    /// The stored cursor never moves backwards.
    pub async fn record_item_outcome(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        debug_assert!(self.counters_consistent());

        const OUTCOME_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET results = $results,
                completed = $completed,
                failed = $failed,
                next_index = math::max([next_index, $next_index]),
                locked_at = $now,
                updated_at = $now
            RETURN AFTER;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(OUTCOME_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("results", self.results.clone()))
            .bind(("completed", self.completed))
            .bind(("failed", self.failed))
            .bind(("next_index", self.next_index))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ProductJob> = result.take(0)?;
        let updated = updated.ok_or_else(|| AppError::NotFound(format!("job {} not found", self.id)))?;
        self.next_index = updated.next_index;
        self.updated_at = updated.updated_at;
        self.locked_at = updated.locked_at;
        Ok(())
    }
}

fn lease_secs(lease_duration: Duration) -> i64 {
    i64::try_from(lease_duration.as_secs()).unwrap_or(DEFAULT_LEASE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::job_params::{ImageMode, PublishMode};

    fn params() -> JobParams {
        JobParams {
            prompt: "vintage mountain hoodie".into(),
            image_mode: ImageMode::Generate,
            publish_mode: PublishMode::Draft,
            markup_percent: 40,
            ..JobParams::default()
        }
    }

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb")
    }

    fn item(index: u32, step: ItemStep, status: ItemStatus) -> ItemResult {
        ItemResult {
            index,
            step,
            status,
            message: step.as_str().to_string(),
            ..ItemResult::default()
        }
    }

    #[test]
    fn test_new_job_defaults() {
        let job = ProductJob::new(params(), 3, "shop-1".into());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.total, 3);
        assert_eq!(job.completed, 0);
        assert_eq!(job.failed, 0);
        assert_eq!(job.next_index, 0);
        assert!(job.results.is_empty());
        assert!(job.worker_id.is_none());
    }

    #[test]
    fn test_upsert_result_replaces_by_index() {
        let mut job = ProductJob::new(params(), 3, "shop-1".into());
        job.upsert_result(item(1, ItemStep::Blueprint, ItemStatus::Pending));
        job.upsert_result(item(1, ItemStep::Provider, ItemStatus::Pending));
        job.upsert_result(item(2, ItemStep::Blueprint, ItemStatus::Pending));
        job.upsert_result(item(1, ItemStep::ProductCreated, ItemStatus::Created));

        assert_eq!(job.results.len(), 2);
        assert_eq!(job.results.first().map(|r| r.step), Some(ItemStep::ProductCreated));
        assert_eq!(job.results.get(1).map(|r| r.index), Some(2));
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert_eq!(
            compute_next_status(&JobStatus::Queued, JobTransition::Start).ok(),
            Some(JobStatus::InProgress)
        );
        assert_eq!(
            compute_next_status(&JobStatus::InProgress, JobTransition::Cancel).ok(),
            Some(JobStatus::Cancelled)
        );
        assert!(compute_next_status(&JobStatus::Completed, JobTransition::Cancel).is_err());
        assert!(compute_next_status(&JobStatus::Cancelled, JobTransition::Start).is_err());
        assert!(compute_next_status(&JobStatus::Failed, JobTransition::Complete).is_err());
        assert!(compute_next_status(&JobStatus::Queued, JobTransition::Complete).is_err());
    }

    #[test]
    fn test_step_names_serialize_kebab_case() {
        let value = serde_json::to_value(ItemStep::PrintAreas).expect("serialize");
        assert_eq!(value, serde_json::json!("print-areas"));
        assert_eq!(ItemStep::PrintAreas.as_str(), "print-areas");
        let value = serde_json::to_value(JobStatus::InProgress).expect("serialize");
        assert_eq!(value, serde_json::json!("in_progress"));
    }

    #[tokio::test]
    async fn test_create_and_fetch_job() {
        let db = memory_db().await;
        let created = ProductJob::create_and_add_to_db(params(), 2, "shop-1".into(), &db)
            .await
            .expect("store");

        let fetched = ProductJob::get(&created.id, &db).await.expect("fetch");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.params, created.params);
        assert_eq!(fetched.status, JobStatus::Queued);

        let missing = ProductJob::get("does-not-exist", &db).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_lease_expires() {
        let db = memory_db().await;
        let job = ProductJob::create_and_add_to_db(params(), 2, "shop-1".into(), &db)
            .await
            .expect("store");
        let now = chrono::Utc::now();
        let lease = Duration::from_secs(60);

        let first = ProductJob::claim(&job.id, &db, "worker-a", now, lease)
            .await
            .expect("claim");
        assert_eq!(
            first.and_then(|j| j.worker_id).as_deref(),
            Some("worker-a")
        );

        let second = ProductJob::claim(&job.id, &db, "worker-b", now, lease)
            .await
            .expect("claim");
        assert!(second.is_none(), "live lease must block other workers");

        let again = ProductJob::claim(&job.id, &db, "worker-a", now, lease)
            .await
            .expect("reclaim");
        assert!(again.is_some(), "owner may refresh its own lease");

        let later = now + chrono::Duration::seconds(120);
        let stolen = ProductJob::claim(&job.id, &db, "worker-b", later, lease)
            .await
            .expect("claim after expiry");
        assert_eq!(
            stolen.and_then(|j| j.worker_id).as_deref(),
            Some("worker-b")
        );
    }

    #[tokio::test]
    async fn test_claim_next_ready_skips_terminal_jobs() {
        let db = memory_db().await;
        let done = ProductJob::create_and_add_to_db(params(), 1, "shop-1".into(), &db)
            .await
            .expect("store");
        ProductJob::cancel(&done.id, &db).await.expect("cancel");
        let open = ProductJob::create_and_add_to_db(params(), 1, "shop-1".into(), &db)
            .await
            .expect("store");

        let claimed = ProductJob::claim_next_ready(
            &db,
            "worker-a",
            chrono::Utc::now(),
            Duration::from_secs(60),
        )
        .await
        .expect("claim")
        .expect("job claimed");
        assert_eq!(claimed.id, open.id);

        let none = ProductJob::claim_next_ready(
            &db,
            "worker-b",
            chrono::Utc::now(),
            Duration::from_secs(60),
        )
        .await
        .expect("claim");
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_progress_and_finish() {
        let db = memory_db().await;
        let job = ProductJob::create_and_add_to_db(params(), 2, "shop-1".into(), &db)
            .await
            .expect("store");
        let mut job = job
            .mark_in_progress(&db)
            .await
            .expect("start")
            .expect("was queued");
        assert_eq!(job.status, JobStatus::InProgress);

        job.upsert_result(item(1, ItemStep::Blueprint, ItemStatus::Pending));
        job.save_results(&db).await.expect("save");
        let snapshot = ProductJob::get(&job.id, &db).await.expect("fetch");
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.next_index, 0);

        job.upsert_result(item(1, ItemStep::ProductCreated, ItemStatus::Created));
        job.completed = 1;
        job.next_index = 1;
        job.record_item_outcome(&db).await.expect("outcome");

        job.upsert_result(item(2, ItemStep::Error, ItemStatus::Failed));
        job.failed = 1;
        job.next_index = 2;
        job.record_item_outcome(&db).await.expect("outcome");

        let finished = job.finish(&db).await.expect("finish").expect("in progress");
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.completed + finished.failed, finished.total);
        assert_eq!(finished.results.len(), 2);
        assert!(finished.worker_id.is_none());
    }

    #[tokio::test]
    async fn test_next_index_never_decreases() {
        let db = memory_db().await;
        let job = ProductJob::create_and_add_to_db(params(), 3, "shop-1".into(), &db)
            .await
            .expect("store");
        let mut job = job.mark_in_progress(&db).await.expect("start").expect("queued");

        job.next_index = 2;
        job.record_item_outcome(&db).await.expect("advance");
        job.next_index = 1;
        job.record_item_outcome(&db).await.expect("stale write");

        let stored = ProductJob::get(&job.id, &db).await.expect("fetch");
        assert_eq!(stored.next_index, 2);
        assert_eq!(job.next_index, 2);
    }

    #[tokio::test]
    async fn test_finish_without_successes_fails_job() {
        let db = memory_db().await;
        let job = ProductJob::create_and_add_to_db(params(), 1, "shop-1".into(), &db)
            .await
            .expect("store");
        let mut job = job.mark_in_progress(&db).await.expect("start").expect("queued");
        job.upsert_result(item(1, ItemStep::Error, ItemStatus::Failed));
        job.failed = 1;
        job.next_index = 1;
        job.record_item_outcome(&db).await.expect("outcome");

        let finished = job.finish(&db).await.expect("finish").expect("in progress");
        assert_eq!(finished.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_respects_terminal_states() {
        let db = memory_db().await;
        let job = ProductJob::create_and_add_to_db(params(), 2, "shop-1".into(), &db)
            .await
            .expect("store");

        let cancelled = ProductJob::cancel(&job.id, &db).await.expect("cancel");
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        let again = ProductJob::cancel(&job.id, &db).await.expect("cancel twice");
        assert_eq!(again.status, JobStatus::Cancelled);

        let start = job.mark_in_progress(&db).await.expect("guarded update");
        assert!(start.is_none(), "cancelled job must not move back to in_progress");

        let empty = ProductJob::create_and_add_to_db(params(), 0, "shop-1".into(), &db)
            .await
            .expect("store");
        let empty = empty.mark_in_progress(&db).await.expect("start").expect("queued");
        let finished = empty.finish(&db).await.expect("finish").expect("in progress");
        assert_eq!(finished.status, JobStatus::Completed);
        let untouched = ProductJob::cancel(&finished.id, &db).await.expect("cancel");
        assert_eq!(untouched.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_for_owner() {
        let db = memory_db().await;
        ProductJob::create_and_add_to_db(params(), 1, "shop-1".into(), &db)
            .await
            .expect("store");
        ProductJob::create_and_add_to_db(params(), 1, "shop-1".into(), &db)
            .await
            .expect("store");
        ProductJob::create_and_add_to_db(params(), 1, "shop-2".into(), &db)
            .await
            .expect("store");

        let jobs = ProductJob::list_for_owner("shop-1", 10, &db)
            .await
            .expect("list");
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.owner_ref == "shop-1"));
    }
}
