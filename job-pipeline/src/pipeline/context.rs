use std::future::Future;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            job_params::ItemOverride,
            product_job::{ItemResult, ItemStep, ProductJob},
        },
    },
};
use tracing::warn;

use crate::{
    content::ProductContent,
    retry::{bounded, RetryPolicy},
    types::{
        catalog::{Blueprint, PrintArea, Provider},
        requests::CreatedProduct,
    },
};

use super::{config::OrchestratorTuning, services::Capabilities};

/// State carried through the steps of one item.
pub struct ItemContext<'a> {
    pub job: &'a mut ProductJob,
    pub db: &'a SurrealDbClient,
    pub tuning: &'a OrchestratorTuning,
    pub capabilities: &'a Capabilities,
    pub retry: &'a RetryPolicy,
    pub job_id: String,
    /// Zero-based position in the job.
    pub position: u32,
    pub prompt: String,
    pub item_override: ItemOverride,
    pub item: ItemResult,
    /// Step currently running, reported if the item fails.
    pub step: ItemStep,
    pub blueprint: Option<Blueprint>,
    pub provider: Option<Provider>,
    pub print_area: Option<PrintArea>,
    pub image_id: Option<String>,
    pub content: Option<ProductContent>,
    pub product: Option<CreatedProduct>,
}

impl<'a> ItemContext<'a> {
    pub fn new(
        job: &'a mut ProductJob,
        db: &'a SurrealDbClient,
        tuning: &'a OrchestratorTuning,
        capabilities: &'a Capabilities,
        retry: &'a RetryPolicy,
        position: u32,
    ) -> Self {
        let job_id = job.id.clone();
        let prompt = job.params.item_prompt(position).to_string();
        let item_override = job.params.item_override(position).cloned().unwrap_or_default();
        let item = ItemResult::pending(position.saturating_add(1));

        Self {
            job,
            db,
            tuning,
            capabilities,
            retry,
            job_id,
            position,
            prompt,
            item_override,
            item,
            step: ItemStep::Started,
            blueprint: None,
            provider: None,
            print_area: None,
            image_id: None,
            content: None,
            product: None,
        }
    }

    /// 1-based index as shown to clients.
    pub fn index(&self) -> u32 {
        self.item.index
    }

    pub fn begin(&mut self, step: ItemStep) {
        self.step = step;
    }

    /// Records that `step` finished and persists the partial result.
    pub async fn advance(&mut self, step: ItemStep, message: impl Into<String>) -> Result<(), AppError> {
        self.item.step = step;
        self.item.message = message.into();
        self.job.upsert_result(self.item.clone());
        self.job.save_results(self.db).await
    }

    /// One capability call under the shared timeout and retry policy.
    pub async fn call<T, A, Fut>(&self, operation: &'static str, mut action: A) -> Result<T, AppError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let limit = self.tuning.call_timeout;
        self.retry
            .run(operation, || bounded(operation, limit, action()))
            .await
    }

    pub fn blueprint(&self) -> Result<&Blueprint, AppError> {
        self.blueprint
            .as_ref()
            .ok_or_else(|| AppError::InternalError("blueprint expected to be chosen".into()))
    }

    pub fn provider(&self) -> Result<&Provider, AppError> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::InternalError("provider expected to be chosen".into()))
    }

    pub fn print_area(&self) -> Result<&PrintArea, AppError> {
        self.print_area
            .as_ref()
            .ok_or_else(|| AppError::InternalError("print area expected to be chosen".into()))
    }

    pub fn image_id(&self) -> Result<&str, AppError> {
        self.image_id
            .as_deref()
            .ok_or_else(|| AppError::InternalError("uploaded image expected to be available".into()))
    }

    pub fn take_content(&mut self) -> Result<ProductContent, AppError> {
        self.content.take().ok_or_else(|| {
            AppError::InternalError("content expected to be available for product creation".into())
        })
    }

    pub fn product(&self) -> Result<&CreatedProduct, AppError> {
        self.product
            .as_ref()
            .ok_or_else(|| AppError::InternalError("product expected to be created".into()))
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        warn!(
            job_id = %self.job_id,
            index = self.index(),
            step = self.step.as_str(),
            error = %err,
            "item pipeline aborted"
        );
        err
    }
}
