use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use common::storage::types::{
    job_params::{ImageMode, ItemOverride, JobParams, PublishMode},
    product_job::{ItemResult, JobStatus, ProductJob},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::{api_state::ApiState, error::ApiError};

pub const MAX_PROMPT_CHARS: usize = 2000;
pub const MAX_MARKUP_PERCENT: u32 = 1000;
pub const DEFAULT_MARKUP_PERCENT: u32 = 40;
pub const DEFAULT_OWNER: &str = "default";
const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

fn default_markup_percent() -> u32 {
    DEFAULT_MARKUP_PERCENT
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub prompt: String,
    /// Number of items; may be omitted when `items` lists them explicitly.
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub items: Vec<ItemOverride>,
    #[serde(default)]
    pub image_mode: ImageMode,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub transparent_background: bool,
    #[serde(default)]
    pub style_hint: Option<String>,
    #[serde(default)]
    pub audience_hint: Option<String>,
    #[serde(default)]
    pub color_hint: Option<String>,
    #[serde(default)]
    pub provider_hint: Option<String>,
    #[serde(default = "default_markup_percent")]
    pub markup_percent: u32,
    #[serde(default)]
    pub publish_mode: PublishMode,
    #[serde(default)]
    pub owner_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Client-facing view of a job. Lease bookkeeping stays internal.
#[derive(Debug, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub owner_ref: String,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub next_index: u32,
    pub results: Vec<ItemResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductJob> for JobSnapshot {
    fn from(job: ProductJob) -> Self {
        Self {
            id: job.id,
            owner_ref: job.owner_ref,
            status: job.status,
            total: job.total,
            completed: job.completed,
            failed: job.failed,
            next_index: job.next_index,
            results: job.results,
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub owner: Option<String>,
    pub limit: Option<u32>,
}

/// Checks a create request and turns it into stored parameters plus the
/// item count.
pub fn validate_request(
    request: CreateJobRequest,
    max_items: u32,
) -> Result<(JobParams, u32, String), ApiError> {
    let listed = u32::try_from(request.items.len())
        .map_err(|_| ApiError::ValidationError("too many items".into()))?;
    let total = match request.count {
        Some(count) if !request.items.is_empty() && count != listed => {
            return Err(ApiError::ValidationError(format!(
                "count ({count}) does not match the number of items ({listed})"
            )));
        }
        Some(count) => count,
        None if !request.items.is_empty() => listed,
        None => {
            return Err(ApiError::ValidationError(
                "either count or items is required".into(),
            ))
        }
    };
    if total > max_items {
        return Err(ApiError::ValidationError(format!(
            "a job may create at most {max_items} items"
        )));
    }

    let prompt = request.prompt.trim().to_string();
    let every_item_prompted = !request.items.is_empty()
        && request
            .items
            .iter()
            .all(|item| item.prompt.as_deref().is_some_and(|p| !p.trim().is_empty()));
    if prompt.is_empty() && !every_item_prompted {
        return Err(ApiError::ValidationError("prompt is required".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS
        || request
            .items
            .iter()
            .filter_map(|item| item.prompt.as_deref())
            .any(|p| p.trim().chars().count() > MAX_PROMPT_CHARS)
    {
        return Err(ApiError::ValidationError(format!(
            "prompts are limited to {MAX_PROMPT_CHARS} characters"
        )));
    }

    if request.image_mode == ImageMode::Upload && request.image_urls.is_empty() {
        return Err(ApiError::ValidationError(
            "image_mode upload requires at least one image url".into(),
        ));
    }
    for raw in &request.image_urls {
        check_image_url(raw)?;
    }

    if request.markup_percent > MAX_MARKUP_PERCENT {
        return Err(ApiError::ValidationError(format!(
            "markup_percent must be at most {MAX_MARKUP_PERCENT}"
        )));
    }

    let owner_ref = request
        .owner_ref
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or(DEFAULT_OWNER)
        .to_string();

    let params = JobParams {
        prompt,
        items: request.items,
        image_mode: request.image_mode,
        image_urls: request.image_urls,
        transparent_background: request.transparent_background,
        style_hint: request.style_hint,
        audience_hint: request.audience_hint,
        color_hint: request.color_hint,
        provider_hint: request.provider_hint,
        markup_percent: request.markup_percent,
        publish_mode: request.publish_mode,
    };

    Ok((params, total, owner_ref))
}

fn check_image_url(raw: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(raw)
        .map_err(|e| ApiError::ValidationError(format!("invalid image url {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ApiError::ValidationError(format!(
            "image url {raw:?} must use http or https, not {other}"
        ))),
    }
}

pub async fn create_job(
    State(state): State<ApiState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (params, total, owner_ref) = validate_request(request, state.config.max_items_per_job)?;

    let job = ProductJob::create_and_add_to_db(params, total, owner_ref, &state.db).await?;
    info!(job_id = %job.id, total, "job created");

    state.dispatch(&job.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status,
            total: job.total,
            completed: job.completed,
            failed: job.failed,
        }),
    ))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = ProductJob::get(&id, &state.db).await?;
    Ok(Json(JobSnapshot::from(job)))
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = ProductJob::cancel(&id, &state.db).await?;
    info!(job_id = %job.id, status = job.status.as_str(), "cancel requested");
    Ok(Json(JobSnapshot::from(job)))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = query.owner.as_deref().unwrap_or(DEFAULT_OWNER);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = ProductJob::list_for_owner(owner, limit, &state.db).await?;
    let snapshots: Vec<JobSnapshot> = jobs.into_iter().map(JobSnapshot::from).collect();
    Ok(Json(snapshots))
}
