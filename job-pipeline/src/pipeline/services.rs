use std::sync::Arc;

use async_trait::async_trait;
use common::error::AppError;

use crate::{
    content::RawContent,
    types::{
        catalog::{Blueprint, PrintArea, Provider},
        requests::{
            ContentSpec, CreatedProduct, ImageSpec, ProducedImage, ProductSpec, PublishOutcome,
            UploadedImage,
        },
    },
};

/// Read access to the print catalog.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn blueprints(&self, scope_hint: &str) -> Result<Vec<Blueprint>, AppError>;

    async fn providers(&self, blueprint_id: u64) -> Result<Vec<Provider>, AppError>;

    async fn print_areas(
        &self,
        blueprint_id: u64,
        provider_id: u64,
    ) -> Result<Vec<PrintArea>, AppError>;
}

/// Generates artwork from a prompt, or post-processes an existing image.
#[async_trait]
pub trait ImageProducer: Send + Sync {
    async fn produce_image(&self, spec: &ImageSpec) -> Result<ProducedImage, AppError>;
}

/// Registers an image with the print platform.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_image(&self, image_url: &str, file_name: &str)
        -> Result<UploadedImage, AppError>;
}

/// Writes listing copy. The caller normalises the output.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(&self, spec: &ContentSpec) -> Result<RawContent, AppError>;
}

/// Creates products on the print platform. Creation uses placeholder prices;
/// `price_product` sets the real ones and must be safe to repeat.
#[async_trait]
pub trait ProductCreator: Send + Sync {
    async fn create_product(&self, spec: &ProductSpec) -> Result<CreatedProduct, AppError>;

    async fn price_product(&self, product_id: &str, markup_percent: u32) -> Result<(), AppError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_product(&self, product_id: &str) -> Result<PublishOutcome, AppError>;
}

/// Everything the orchestrator talks to outside the job store.
#[derive(Clone)]
pub struct Capabilities {
    pub catalog: Arc<dyn CatalogLookup>,
    pub images: Arc<dyn ImageProducer>,
    pub uploader: Arc<dyn ImageUploader>,
    pub content: Arc<dyn ContentGenerator>,
    pub products: Arc<dyn ProductCreator>,
    pub publisher: Arc<dyn Publisher>,
}

impl Capabilities {
    /// Uses one implementation for every capability.
    pub fn from_shared<S>(service: Arc<S>) -> Self
    where
        S: CatalogLookup
            + ImageProducer
            + ImageUploader
            + ContentGenerator
            + ProductCreator
            + Publisher
            + 'static,
    {
        Self {
            catalog: service.clone(),
            images: service.clone(),
            uploader: service.clone(),
            content: service.clone(),
            products: service.clone(),
            publisher: service,
        }
    }
}
