use common::{
    error::AppError,
    storage::types::{
        job_params::{ImageMode, JobParams},
        product_job::{ItemStatus, ItemStep},
    },
    utils::sanitize::sanitize_error,
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use crate::{
    content::ProductContent,
    selection::{choose_blueprint, choose_print_area, choose_provider},
    types::requests::{ContentSpec, ImageSpec, ProductSpec},
};

use super::{
    context::ItemContext,
    state::{
        BlueprintChosen, ContentReady, ImageReady, ImageUploaded, ItemMachine, PrintAreaChosen,
        ProductCreated, ProviderChosen, Ready, Settled,
    },
};

pub const IMAGE_FAILED: &str = "image generation/upload failed";
pub const UPLOAD_FAILED: &str = "image upload failed";
pub const CONTENT_FAILED: &str = "content generation failed";
pub const PRODUCT_FAILED: &str = "product creation failed";
pub const ITEM_FAILED: &str = "item failed";
pub const ITEM_TIMED_OUT: &str = "item timed out";
pub const PRICING_SKIPPED: &str = "item timed out before pricing";
pub const PUBLISH_SKIPPED_TIMEOUT: &str = "not published: item timed out";
pub const PUBLISH_SKIPPED_PRICING: &str = "not published: pricing failed";

/// Message stored on an item that failed while `step` was running.
pub fn failure_message(step: ItemStep) -> &'static str {
    match step {
        ItemStep::Blueprint => crate::selection::NO_BLUEPRINT,
        ItemStep::Provider => crate::selection::NO_PROVIDER,
        ItemStep::PrintAreas => crate::selection::NO_PRINT_AREA,
        ItemStep::ImageReady => IMAGE_FAILED,
        ItemStep::ImageUploaded => UPLOAD_FAILED,
        ItemStep::ContentReady => CONTENT_FAILED,
        ItemStep::ProductCreated => PRODUCT_FAILED,
        ItemStep::Started | ItemStep::Published | ItemStep::Error => ITEM_FAILED,
    }
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn resolve_blueprint(
    machine: ItemMachine<(), Ready>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), BlueprintChosen>, AppError> {
    ctx.begin(ItemStep::Blueprint);

    let blueprints = ctx
        .call("catalog.blueprints", || {
            ctx.capabilities.catalog.blueprints(&ctx.prompt)
        })
        .await?;
    let blueprint =
        choose_blueprint(&blueprints, &ctx.prompt, ctx.item_override.blueprint_id)?.clone();

    debug!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        candidates = blueprints.len(),
        blueprint_id = blueprint.id,
        "blueprint chosen"
    );

    let message = format!("blueprint selected: {}", blueprint.title);
    ctx.blueprint = Some(blueprint);
    ctx.advance(ItemStep::Blueprint, message).await?;

    machine
        .choose_blueprint()
        .map_err(|(_, guard)| map_guard_error("choose_blueprint", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn resolve_provider(
    machine: ItemMachine<(), BlueprintChosen>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ProviderChosen>, AppError> {
    ctx.begin(ItemStep::Provider);

    let blueprint_id = ctx.blueprint()?.id;
    let providers = ctx
        .call("catalog.providers", || {
            ctx.capabilities.catalog.providers(blueprint_id)
        })
        .await?;
    let provider = choose_provider(
        &providers,
        ctx.job.params.provider_hint.as_deref(),
        ctx.item_override.provider_id,
    )?
    .clone();

    debug!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        candidates = providers.len(),
        provider_id = provider.id,
        "provider chosen"
    );

    let message = format!("provider selected: {}", provider.title);
    ctx.provider = Some(provider);
    ctx.advance(ItemStep::Provider, message).await?;

    machine
        .choose_provider()
        .map_err(|(_, guard)| map_guard_error("choose_provider", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn resolve_print_area(
    machine: ItemMachine<(), ProviderChosen>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), PrintAreaChosen>, AppError> {
    ctx.begin(ItemStep::PrintAreas);

    let blueprint_id = ctx.blueprint()?.id;
    let provider_id = ctx.provider()?.id;
    let areas = ctx
        .call("catalog.print_areas", || {
            ctx.capabilities
                .catalog
                .print_areas(blueprint_id, provider_id)
        })
        .await?;
    let area = choose_print_area(
        &areas,
        &ctx.prompt,
        ctx.item_override.print_positions.as_deref(),
    )?
    .clone();

    debug!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        position = %area.position,
        width = area.width,
        height = area.height,
        "print area chosen"
    );

    let message = format!("print area selected: {}", area.position);
    ctx.print_area = Some(area);
    ctx.advance(ItemStep::PrintAreas, message).await?;

    machine
        .choose_print_area()
        .map_err(|(_, guard)| map_guard_error("choose_print_area", &guard))
}

/// Prompt sent to the image model. Transparency is requested in the prompt
/// itself since background removal only works on existing rasters.
pub fn generation_prompt(prompt: &str, params: &JobParams) -> String {
    let mut parts = vec![prompt.trim().to_string()];
    if let Some(style) = non_blank(params.style_hint.as_deref()) {
        parts.push(format!("Style: {style}"));
    }
    if let Some(colors) = non_blank(params.color_hint.as_deref()) {
        parts.push(format!("Color palette: {colors}"));
    }
    if let Some(audience) = non_blank(params.audience_hint.as_deref()) {
        parts.push(format!("Made for: {audience}"));
    }
    if params.transparent_background {
        parts.push("Isolated subject on a transparent background, no backdrop or scenery".into());
    }
    parts.push("Print-ready artwork for merchandise, centered composition".into());
    parts.join(". ")
}

enum ImageSource {
    Existing(String),
    Produce(ImageSpec),
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn prepare_image(
    machine: ItemMachine<(), PrintAreaChosen>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ImageReady>, AppError> {
    ctx.begin(ItemStep::ImageReady);

    let area = ctx.print_area()?.clone();
    let params = &ctx.job.params;
    let source = match params.image_mode {
        ImageMode::Upload => {
            let url = params
                .source_image(ctx.position)
                .ok_or_else(|| AppError::Validation("no source images to choose from".into()))?
                .to_string();
            if params.transparent_background {
                ImageSource::Produce(ImageSpec {
                    prompt: None,
                    source_image_url: Some(url),
                    width: area.width,
                    height: area.height,
                    transparent: true,
                })
            } else {
                ImageSource::Existing(url)
            }
        }
        ImageMode::Generate => ImageSource::Produce(ImageSpec {
            prompt: Some(generation_prompt(&ctx.prompt, params)),
            source_image_url: None,
            width: area.width,
            height: area.height,
            transparent: params.transparent_background,
        }),
    };

    let image_url = match source {
        ImageSource::Existing(url) => url,
        ImageSource::Produce(spec) => {
            ctx.call("image.produce", || ctx.capabilities.images.produce_image(&spec))
                .await?
                .image_url
        }
    };

    debug!(job_id = %ctx.job_id, index = ctx.index(), %image_url, "image ready");

    ctx.item.image_url = Some(image_url);
    ctx.advance(ItemStep::ImageReady, "image ready").await?;

    machine
        .prepare_image()
        .map_err(|(_, guard)| map_guard_error("prepare_image", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn upload_image(
    machine: ItemMachine<(), ImageReady>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ImageUploaded>, AppError> {
    ctx.begin(ItemStep::ImageUploaded);

    let image_url = ctx
        .item
        .image_url
        .clone()
        .ok_or_else(|| AppError::InternalError("image url expected to be available".into()))?;
    let file_name = format!("{}-item-{}.png", ctx.job_id, ctx.index());
    let uploaded = ctx
        .call("image.upload", || {
            ctx.capabilities.uploader.upload_image(&image_url, &file_name)
        })
        .await?;

    debug!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        image_id = %uploaded.external_image_id,
        "image uploaded"
    );

    ctx.image_id = Some(uploaded.external_image_id);
    ctx.advance(ItemStep::ImageUploaded, "image uploaded").await?;

    machine
        .upload_image()
        .map_err(|(_, guard)| map_guard_error("upload_image", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn write_content(
    machine: ItemMachine<(), ImageUploaded>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ContentReady>, AppError> {
    ctx.begin(ItemStep::ContentReady);

    let product_type = ctx.blueprint()?.title.clone();
    let params = &ctx.job.params;
    let spec = ContentSpec {
        prompt: ctx.prompt.clone(),
        product_type: product_type.clone(),
        style_hint: params.style_hint.clone(),
        audience_hint: params.audience_hint.clone(),
        color_hint: params.color_hint.clone(),
    };
    let raw = ctx
        .call("content.generate", || {
            ctx.capabilities.content.generate_content(&spec)
        })
        .await?;
    let fallback_title = format!("{} {}", ctx.prompt.trim(), product_type);
    let content = ProductContent::normalize(raw, &fallback_title);

    debug!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        title = %content.title,
        "content ready"
    );

    ctx.item.title = Some(content.title.clone());
    ctx.content = Some(content);
    ctx.advance(ItemStep::ContentReady, "content generated").await?;

    machine
        .write_content()
        .map_err(|(_, guard)| map_guard_error("write_content", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn create_product(
    machine: ItemMachine<(), ContentReady>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), ProductCreated>, AppError> {
    ctx.begin(ItemStep::ProductCreated);

    let spec = ProductSpec {
        blueprint_id: ctx.blueprint()?.id,
        provider_id: ctx.provider()?.id,
        print_position: ctx.print_area()?.position.clone(),
        image_id: ctx.image_id()?.to_string(),
        content: ctx.take_content()?,
    };
    let product = ctx
        .call("product.create", || {
            ctx.capabilities.products.create_product(&spec)
        })
        .await?;

    info!(
        job_id = %ctx.job_id,
        index = ctx.index(),
        product_id = %product.product_id,
        "product created"
    );

    ctx.item.status = ItemStatus::Created;
    ctx.item.product_id = Some(product.product_id.clone());
    ctx.item.title = Some(product.title.clone());
    ctx.product = Some(product);
    ctx.advance(ItemStep::ProductCreated, "product created").await?;

    machine
        .create_product()
        .map_err(|(_, guard)| map_guard_error("create_product", &guard))
}

/// Prices the created product and publishes it when the job asks for it.
/// Neither failure undoes the product: the item stays `created` with the
/// reason in `pricing_error` or `publish_error`. An unpriced product is
/// never published.
#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, index = ctx.index()))]
pub async fn settle(
    machine: ItemMachine<(), ProductCreated>,
    ctx: &mut ItemContext<'_>,
) -> Result<ItemMachine<(), Settled>, AppError> {
    let product_id = ctx.product()?.product_id.clone();
    let markup_percent = ctx.job.params.markup_percent;

    let priced = ctx
        .call("product.price", || {
            ctx.capabilities
                .products
                .price_product(&product_id, markup_percent)
        })
        .await;
    match priced {
        Ok(()) => ctx.advance(ItemStep::ProductCreated, "product created and priced").await?,
        Err(err) => {
            warn!(
                job_id = %ctx.job_id,
                index = ctx.index(),
                %product_id,
                error = %err,
                "pricing failed; product keeps placeholder prices"
            );
            ctx.item.pricing_error = Some(sanitize_error(&err.to_string()));
            ctx.advance(ItemStep::ProductCreated, "product created; pricing failed")
                .await?;
        }
    }

    if ctx.job.params.publishes() {
        if ctx.item.pricing_error.is_some() {
            ctx.item.publish_error = Some(PUBLISH_SKIPPED_PRICING.into());
        } else {
            publish(ctx, &product_id).await?;
        }
    }

    machine
        .settle()
        .map_err(|(_, guard)| map_guard_error("settle", &guard))
}

async fn publish(ctx: &mut ItemContext<'_>, product_id: &str) -> Result<(), AppError> {
    ctx.begin(ItemStep::Published);
    let outcome = ctx
        .call("product.publish", || {
            ctx.capabilities.publisher.publish_product(product_id)
        })
        .await;

    match outcome {
        Ok(outcome) if outcome.published => {
            ctx.item.status = ItemStatus::Published;
            ctx.advance(ItemStep::Published, "product published").await
        }
        Ok(_) => {
            ctx.item.publish_error = Some("publish was not accepted".into());
            ctx.advance(ItemStep::ProductCreated, "product created; publish failed")
                .await
        }
        Err(err) => {
            warn!(
                job_id = %ctx.job_id,
                index = ctx.index(),
                error = %err,
                "publish failed; keeping product as created"
            );
            ctx.item.publish_error = Some(sanitize_error(&err.to_string()));
            ctx.advance(ItemStep::ProductCreated, "product created; publish failed")
                .await
        }
    }
}

/// The item budget ran out after the product was created. The product is
/// kept; pricing and publishing did not run.
pub fn keep_created_after_timeout(ctx: &mut ItemContext<'_>) {
    ctx.item.status = ItemStatus::Created;
    ctx.item.step = ItemStep::ProductCreated;
    ctx.item.message = "product created; item timed out".into();
    ctx.item.pricing_error = Some(PRICING_SKIPPED.into());
    if ctx.job.params.publishes() {
        ctx.item.publish_error = Some(PUBLISH_SKIPPED_TIMEOUT.into());
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid item pipeline transition during {event}: {guard:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_follow_the_failing_step() {
        assert_eq!(failure_message(ItemStep::Blueprint), "no suitable blueprint found");
        assert_eq!(failure_message(ItemStep::Provider), "no provider available");
        assert_eq!(failure_message(ItemStep::PrintAreas), "no print areas available");
        assert_eq!(failure_message(ItemStep::ImageReady), IMAGE_FAILED);
        assert_eq!(failure_message(ItemStep::ContentReady), CONTENT_FAILED);
    }

    #[test]
    fn generation_prompt_carries_hints_and_transparency() {
        let params = JobParams {
            prompt: "a fox".into(),
            style_hint: Some("watercolor".into()),
            color_hint: Some("  ".into()),
            transparent_background: true,
            ..JobParams::default()
        };
        let prompt = generation_prompt("a fox", &params);
        assert!(prompt.starts_with("a fox. Style: watercolor"));
        assert!(!prompt.contains("Color palette"));
        assert!(prompt.contains("transparent background"));

        let opaque = JobParams {
            transparent_background: false,
            ..params
        };
        assert!(!generation_prompt("a fox", &opaque).contains("transparent"));
    }
}
