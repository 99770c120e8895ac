pub mod image_client;
pub mod sse;
pub mod text_client;

use crate::{
    config::GeminiConfig,
    error::{AppError, Result},
    models::{GenerateContentRequest, GenerateContentResponse},
};
use async_trait::async_trait;
use futures::stream::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use std::pin::Pin;
use std::sync::Arc;

pub use image_client::ImageClient;
pub use text_client::TextClient;

pub type ContentStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// The two model calls the pipeline needs from a provider.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ContentStream>;
}

/// Builds one provider client per request from that request's credential.
pub trait ClientFactory: Send + Sync {
    fn create(&self, credential: &str) -> Result<Arc<dyn GenerativeModel>>;
}

#[derive(Clone)]
pub struct GeminiClient {
    text_client: TextClient,
    image_client: ImageClient,
}

impl GeminiClient {
    /// Fails with `ProviderAuth` when the credential cannot be sent as a header.
    pub fn new(credential: &str, config: &GeminiConfig) -> Result<Self> {
        let mut api_key =
            HeaderValue::from_str(credential.trim()).map_err(|_| AppError::ProviderAuth)?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                log::error!("Failed to build Gemini HTTP client: {}", e);
                AppError::ProviderAuth
            })?;

        let base_url = config.base_url().trim_end_matches('/').to_string();

        Ok(Self {
            text_client: TextClient::new(http.clone(), base_url.clone()),
            image_client: ImageClient::new(http, base_url),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.text_client.generate(model, request).await
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ContentStream> {
        self.image_client.generate_stream(model, request).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeminiClientFactory {
    config: GeminiConfig,
}

impl GeminiClientFactory {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for GeminiClientFactory {
    fn create(&self, credential: &str) -> Result<Arc<dyn GenerativeModel>> {
        Ok(Arc::new(GeminiClient::new(credential, &self.config)?))
    }
}

pub(crate) fn model_url(base_url: &str, model: &str, method: &str) -> String {
    let model = model.trim();
    let path = if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    };
    format!("{}/{}:{}", base_url.trim_end_matches('/'), path, method)
}

pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string());

    log::error!("Gemini API returned {}: {}", status, message);
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}
