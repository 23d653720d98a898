pub mod background;
pub mod openai;
pub mod printify;

use std::{sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use backoff::ExponentialBackoffBuilder;
use common::{
    error::{AppError, ExternalCallError},
    utils::{config::AppConfig, sanitize::sanitize_error},
};
use reqwest::Response;

use crate::pipeline::Capabilities;

use self::{
    background::BackgroundRemover,
    openai::{OpenAiContentGenerator, OpenAiImageProducer},
    printify::PrintifyClient,
};

/// Production capability set: Printify for catalog and products, OpenAI
/// for copy and artwork.
pub fn default_capabilities(config: &AppConfig) -> Result<Capabilities, AppError> {
    let http = http_client(config)?;
    let openai_client = Arc::new(openai_client(
        &config.openai_api_key,
        &config.openai_base_url,
    ));

    let printify = Arc::new(PrintifyClient::new(
        http.clone(),
        &config.printify_base_url,
        &config.printify_api_token,
        &config.printify_shop_id,
    ));
    let remover = config
        .background_removal_url
        .as_deref()
        .map(|url| BackgroundRemover::new(http, url));

    Ok(Capabilities {
        catalog: printify.clone(),
        images: Arc::new(OpenAiImageProducer::new(
            Arc::clone(&openai_client),
            &config.image_model,
            remover,
        )),
        uploader: printify.clone(),
        content: Arc::new(OpenAiContentGenerator::new(
            openai_client,
            &config.content_model,
        )),
        products: printify.clone(),
        publisher: printify,
    })
}

/// OpenAI client with the SDK's internal retry loop switched off, so a
/// failing call surfaces immediately and only [`crate::retry::RetryPolicy`] retries.
pub fn openai_client(api_key: &str, api_base: &str) -> Client<OpenAIConfig> {
    let no_retries = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();
    Client::with_config(
        OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base),
    )
    .with_backoff(no_retries)
}

pub fn http_client(config: &AppConfig) -> Result<reqwest::Client, AppError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.external_call_timeout_secs))
        .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Turns a non-success response into an [`ExternalCallError`] carrying the
/// status and a sanitised slice of the body.
pub async fn ensure_success(response: Response) -> Result<Response, ExternalCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("error");
    Err(ExternalCallError::with_status(
        status.as_u16(),
        sanitize_error(&format!("{reason}: {body}")),
    ))
}

#[cfg(test)]
pub(crate) mod test_server {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base url.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let address = listener.local_addr().expect("stub server address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{address}")
    }
}
