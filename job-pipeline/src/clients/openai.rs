use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateImageRequestArgs,
        Image, ImageModel, ImageResponseFormat, ImageSize, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use common::error::{AppError, ExternalCallError};
use tracing::debug;

use crate::{
    content::RawContent,
    pipeline::{ContentGenerator, ImageProducer},
    types::requests::{ContentSpec, ImageSpec, ProducedImage},
    utils::llm_instructions::{
        get_listing_copy_schema, listing_copy_user_message, LISTING_COPY_SYSTEM_MESSAGE,
    },
};

use super::background::BackgroundRemover;

/// Listing copy from a chat model constrained by a JSON schema.
pub struct OpenAiContentGenerator {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiContentGenerator {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    fn prepare_request(&self, spec: &ContentSpec) -> Result<CreateChatCompletionRequest, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Marketplace listing copy for one product".into()),
                name: "listing_copy".into(),
                schema: Some(get_listing_copy_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(LISTING_COPY_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(listing_copy_user_message(spec)).into(),
            ])
            .response_format(response_format)
            .build()?;

        Ok(request)
    }
}

#[async_trait]
impl ContentGenerator for OpenAiContentGenerator {
    async fn generate_content(&self, spec: &ContentSpec) -> Result<RawContent, AppError> {
        let request = self.prepare_request(spec)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(ExternalCallError::from)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))?;

        parse_listing_copy(content)
    }
}

pub fn parse_listing_copy(content: &str) -> Result<RawContent, AppError> {
    serde_json::from_str::<RawContent>(content).map_err(|e| {
        AppError::LLMParsing(format!("Failed to parse LLM response into listing copy: {e}"))
    })
}

/// Generates artwork with an image model. Existing images are only passed
/// through the background remover.
pub struct OpenAiImageProducer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    remover: Option<BackgroundRemover>,
}

/// Closest supported canvas for the print area's aspect ratio.
pub fn canvas_for(width: u32, height: u32) -> ImageSize {
    let (w, h) = (u64::from(width), u64::from(height));
    if w.saturating_mul(10) > h.saturating_mul(13) {
        ImageSize::S1792x1024
    } else if h.saturating_mul(10) > w.saturating_mul(13) {
        ImageSize::S1024x1792
    } else {
        ImageSize::S1024x1024
    }
}

impl OpenAiImageProducer {
    pub fn new(
        client: Arc<Client<OpenAIConfig>>,
        model: &str,
        remover: Option<BackgroundRemover>,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            remover,
        }
    }

    async fn generate(&self, prompt: &str, spec: &ImageSpec) -> Result<String, AppError> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(ImageModel::Other(self.model.clone()))
            .n(1)
            .size(canvas_for(spec.width, spec.height))
            .response_format(ImageResponseFormat::Url)
            .build()?;

        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(ExternalCallError::from)?;

        match response.data.first().map(|image| image.as_ref()) {
            Some(Image::Url { url, .. }) => Ok(url.clone()),
            Some(_) => Err(ExternalCallError::new(None, "image returned without a url").into()),
            None => Err(ExternalCallError::new(None, "image response was empty").into()),
        }
    }
}

#[async_trait]
impl ImageProducer for OpenAiImageProducer {
    async fn produce_image(&self, spec: &ImageSpec) -> Result<ProducedImage, AppError> {
        if let Some(source) = spec.source_image_url.as_deref() {
            let image_url = match (&self.remover, spec.transparent) {
                (Some(remover), true) => remover.remove_background(source).await?,
                _ => {
                    debug!("no background remover configured; using source image");
                    source.to_string()
                }
            };
            return Ok(ProducedImage { image_url });
        }

        let prompt = spec
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::Validation("image prompt is empty".into()))?;
        let image_url = self.generate(prompt, spec).await?;
        Ok(ProducedImage { image_url })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use axum::{extract::State, http::StatusCode, Router};

    use super::*;
    use crate::{
        clients::{openai_client, test_server::serve},
        retry::RetryPolicy,
    };

    async fn overloaded(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
        hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::SERVICE_UNAVAILABLE, "upstream connect error")
    }

    fn content_spec() -> ContentSpec {
        ContentSpec {
            prompt: "retro fox".into(),
            product_type: "Tee".into(),
            ..ContentSpec::default()
        }
    }

    #[tokio::test]
    async fn server_errors_surface_after_one_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(Router::new().fallback(overloaded).with_state(Arc::clone(&hits))).await;
        let generator =
            OpenAiContentGenerator::new(Arc::new(openai_client("sk-test", &base)), "gpt-4o-mini");
        let spec = content_spec();

        let err = generator
            .generate_content(&spec)
            .await
            .expect_err("stub is overloaded");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(err.as_external().is_some_and(|e| e.is_transient()));

        let retry = RetryPolicy::with_delay(Duration::from_millis(1));
        let err = retry
            .run("content.generate", || generator.generate_content(&spec))
            .await
            .expect_err("still overloaded");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(err.as_external().and_then(|e| e.status), Some(502));
    }

    #[test]
    fn canvas_follows_aspect_ratio() {
        assert!(matches!(canvas_for(4000, 4500), ImageSize::S1024x1024));
        assert!(matches!(canvas_for(6000, 2000), ImageSize::S1792x1024));
        assert!(matches!(canvas_for(1000, 3000), ImageSize::S1024x1792));
    }

    #[test]
    fn listing_copy_tolerates_missing_lists() {
        let parsed = parse_listing_copy(r#"{"title":"Fox Tee","description":"A fox."}"#)
            .expect("parse");
        assert_eq!(parsed.title, "Fox Tee");
        assert!(parsed.tags.is_empty());

        assert!(matches!(
            parse_listing_copy("not json"),
            Err(AppError::LLMParsing(_))
        ));
    }

    #[tokio::test]
    async fn source_images_pass_through_without_remover() {
        let client = Arc::new(Client::with_config(OpenAIConfig::new()));
        let producer = OpenAiImageProducer::new(client, "dall-e-3", None);
        let produced = producer
            .produce_image(&ImageSpec {
                prompt: None,
                source_image_url: Some("https://cdn.example.com/a.png".into()),
                width: 100,
                height: 100,
                transparent: true,
            })
            .await
            .expect("pass through");
        assert_eq!(produced.image_url, "https://cdn.example.com/a.png");
    }
}
