use async_trait::async_trait;
use common::error::{AppError, ExternalCallError};
use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    content::ProductContent,
    pipeline::{CatalogLookup, ImageUploader, ProductCreator, Publisher},
    types::{
        catalog::{Blueprint, PrintArea, Provider},
        requests::{CreatedProduct, ProductSpec, PublishOutcome, UploadedImage},
    },
};

use super::ensure_success;

/// Printify rejects products with more enabled variants than this.
pub const MAX_ENABLED_VARIANTS: usize = 100;
/// Price sent on creation, replaced once the real variant costs are known.
pub const PLACEHOLDER_PRICE_CENTS: u64 = 2_500;

/// Printify REST client covering catalog, uploads, products and publishing.
pub struct PrintifyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    shop_id: String,
    blueprints: OnceCell<Vec<Blueprint>>,
}

#[derive(Debug, Deserialize)]
struct PrintifyProvider {
    id: u64,
    title: String,
    #[serde(default)]
    location: Option<PrintifyLocation>,
}

#[derive(Debug, Deserialize)]
struct PrintifyLocation {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VariantCatalog {
    #[serde(default)]
    variants: Vec<CatalogVariant>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogVariant {
    id: u64,
    #[serde(default)]
    placeholders: Vec<Placeholder>,
}

#[derive(Debug, Clone, Deserialize)]
struct Placeholder {
    position: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    variants: Vec<ProductVariant>,
}

#[derive(Debug, Deserialize)]
struct ProductVariant {
    id: u64,
    #[serde(default)]
    cost: Option<u64>,
    #[serde(default)]
    is_enabled: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct VariantPrice {
    id: u64,
    price: u64,
    is_enabled: bool,
}

/// One area per position, taking the first variant's dimensions.
fn print_areas_from(catalog: &VariantCatalog) -> Vec<PrintArea> {
    let mut areas: Vec<PrintArea> = Vec::new();
    for placeholder in catalog.variants.iter().flat_map(|v| &v.placeholders) {
        if areas.iter().any(|a| a.position == placeholder.position) {
            continue;
        }
        areas.push(PrintArea {
            position: placeholder.position.clone(),
            width: placeholder.width,
            height: placeholder.height,
        });
    }
    areas
}

/// Variant ids that can carry art at `position`, capped at the platform limit.
fn variants_for_position(catalog: &VariantCatalog, position: &str) -> Vec<u64> {
    catalog
        .variants
        .iter()
        .filter(|v| v.placeholders.iter().any(|p| p.position == position))
        .map(|v| v.id)
        .take(MAX_ENABLED_VARIANTS)
        .collect()
}

/// `cost` raised by `markup_percent`, rounded up to whole cents.
pub fn marked_up_price(cost_cents: u64, markup_percent: u32) -> u64 {
    let factor = 100_u64.saturating_add(u64::from(markup_percent));
    cost_cents
        .saturating_mul(factor)
        .saturating_add(99)
        .checked_div(100)
        .unwrap_or(cost_cents)
}

/// Printify has no fields for features or materials, so they are folded
/// into the description.
fn listing_description(content: &ProductContent) -> String {
    let features = content
        .key_features
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nKey features:\n{}\n\nMaterials: {}",
        content.description,
        features,
        content.materials.join(", ")
    )
}

fn repriced_variants(variants: &[ProductVariant], markup_percent: u32) -> Vec<VariantPrice> {
    variants
        .iter()
        .filter(|v| v.is_enabled)
        .filter_map(|v| {
            v.cost.map(|cost| VariantPrice {
                id: v.id,
                price: marked_up_price(cost, markup_percent),
                is_enabled: true,
            })
        })
        .collect()
}

impl PrintifyClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str, shop_id: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            shop_id: shop_id.to_string(),
            blueprints: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, ExternalCallError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        ensure_success(request.send().await?).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ExternalCallError> {
        let response = self.execute(method, path, body).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|err| {
            ExternalCallError::with_status(status, format!("unexpected response shape: {err}"))
        })
    }

    async fn variant_catalog(
        &self,
        blueprint_id: u64,
        provider_id: u64,
    ) -> Result<VariantCatalog, ExternalCallError> {
        self.send(
            Method::GET,
            &format!(
                "catalog/blueprints/{blueprint_id}/print_providers/{provider_id}/variants.json"
            ),
            None,
        )
        .await
    }
}

#[async_trait]
impl CatalogLookup for PrintifyClient {
    async fn blueprints(&self, scope_hint: &str) -> Result<Vec<Blueprint>, AppError> {
        debug!(scope_hint, "catalog lookup");
        let blueprints = self
            .blueprints
            .get_or_try_init(|| self.send(Method::GET, "catalog/blueprints.json", None))
            .await?;
        Ok(blueprints.clone())
    }

    async fn providers(&self, blueprint_id: u64) -> Result<Vec<Provider>, AppError> {
        let providers: Vec<PrintifyProvider> = self
            .send(
                Method::GET,
                &format!("catalog/blueprints/{blueprint_id}/print_providers.json"),
                None,
            )
            .await?;
        Ok(providers
            .into_iter()
            .map(|p| Provider {
                id: p.id,
                title: p.title,
                location: p.location.and_then(|l| l.country),
            })
            .collect())
    }

    async fn print_areas(
        &self,
        blueprint_id: u64,
        provider_id: u64,
    ) -> Result<Vec<PrintArea>, AppError> {
        let catalog = self.variant_catalog(blueprint_id, provider_id).await?;
        Ok(print_areas_from(&catalog))
    }
}

#[async_trait]
impl ImageUploader for PrintifyClient {
    async fn upload_image(
        &self,
        image_url: &str,
        file_name: &str,
    ) -> Result<UploadedImage, AppError> {
        let uploaded: UploadResponse = self
            .send(
                Method::POST,
                "uploads/images.json",
                Some(json!({ "file_name": file_name, "url": image_url })),
            )
            .await?;
        Ok(UploadedImage {
            external_image_id: uploaded.id,
        })
    }
}

#[async_trait]
impl ProductCreator for PrintifyClient {
    async fn create_product(&self, spec: &ProductSpec) -> Result<CreatedProduct, AppError> {
        let catalog = self
            .variant_catalog(spec.blueprint_id, spec.provider_id)
            .await?;
        let variant_ids = variants_for_position(&catalog, &spec.print_position);
        if variant_ids.is_empty() {
            return Err(AppError::Selection(format!(
                "no variants support print position {}",
                spec.print_position
            )));
        }

        let variants: Vec<_> = variant_ids
            .iter()
            .map(|id| json!({ "id": id, "price": PLACEHOLDER_PRICE_CENTS, "is_enabled": true }))
            .collect();
        let body = json!({
            "title": spec.content.title,
            "description": listing_description(&spec.content),
            "tags": spec.content.tags,
            "blueprint_id": spec.blueprint_id,
            "print_provider_id": spec.provider_id,
            "variants": variants,
            "print_areas": [{
                "variant_ids": variant_ids,
                "placeholders": [{
                    "position": spec.print_position,
                    "images": [{ "id": spec.image_id, "x": 0.5, "y": 0.5, "scale": 1.0, "angle": 0 }]
                }]
            }]
        });

        let product: ProductResponse = self
            .send(
                Method::POST,
                &format!("shops/{}/products.json", self.shop_id),
                Some(body),
            )
            .await?;

        Ok(CreatedProduct {
            product_id: product.id,
            title: product.title,
        })
    }

    /// Reads the product back and replaces the placeholder prices. Each call
    /// starts from the stored costs, so repeating it sets the same prices.
    async fn price_product(&self, product_id: &str, markup_percent: u32) -> Result<(), AppError> {
        let path = format!("shops/{}/products/{product_id}.json", self.shop_id);
        let product: ProductResponse = self.send(Method::GET, &path, None).await?;

        let prices = repriced_variants(&product.variants, markup_percent);
        if prices.is_empty() {
            debug!(product_id, "no variant costs reported; keeping placeholder prices");
            return Ok(());
        }
        self.execute(Method::PUT, &path, Some(json!({ "variants": prices })))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for PrintifyClient {
    async fn publish_product(&self, product_id: &str) -> Result<PublishOutcome, AppError> {
        let body = json!({
            "title": true,
            "description": true,
            "images": true,
            "variants": true,
            "tags": true,
            "keyFeatures": true,
            "shipping_template": true
        });
        self.execute(
            Method::POST,
            &format!("shops/{}/products/{product_id}/publish.json", self.shop_id),
            Some(body),
        )
        .await?;
        Ok(PublishOutcome { published: true })
    }
}
