use crate::{
    error::{AppError, Result},
    models::{GenerateContentRequest, GenerateContentResponse},
};

use super::{check_status, model_url};

/// Unary `generateContent` calls, used for prompt refinement.
#[derive(Clone)]
pub struct TextClient {
    http: reqwest::Client,
    base_url: String,
}

impl TextClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = model_url(&self.base_url, model, "generateContent");

        log::info!("Invoking text model: {}", model);
        log::debug!(
            "Text request has {} content block(s), thinking: {}",
            request.contents.len(),
            request
                .generation_config
                .as_ref()
                .map_or(false, |c| c.thinking_config.is_some())
        );

        let response = self.http.post(&url).json(request).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| AppError::Response(format!("malformed generateContent response: {}", e)))
    }
}
