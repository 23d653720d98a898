use common::error::ExternalCallError;
use serde::{Deserialize, Serialize};

use super::ensure_success;

#[derive(Debug, Serialize)]
struct RemovalRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemovalResponse {
    image_url: String,
}

/// HTTP service that returns a transparent-background copy of a raster image.
#[derive(Clone)]
pub struct BackgroundRemover {
    http: reqwest::Client,
    endpoint: String,
}

impl BackgroundRemover {
    pub fn new(http: reqwest::Client, endpoint: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }

    pub async fn remove_background(&self, image_url: &str) -> Result<String, ExternalCallError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RemovalRequest { image_url })
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let status = response.status().as_u16();
        let body: RemovalResponse = response.json().await.map_err(|err| {
            ExternalCallError::with_status(status, format!("unexpected response shape: {err}"))
        })?;
        if body.image_url.trim().is_empty() {
            return Err(ExternalCallError::with_status(
                status,
                "background removal returned an empty url",
            ));
        }
        Ok(body.image_url)
    }
}
