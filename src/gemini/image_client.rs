use crate::{
    error::{AppError, Result},
    models::{GenerateContentRequest, GenerateContentResponse},
};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio_stream::wrappers::ReceiverStream;

use super::{check_status, model_url, sse::SseDecoder, ContentStream};

/// Streaming `streamGenerateContent` calls, used for image generation.
#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    base_url: String,
}

impl ImageClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn generate_stream(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ContentStream> {
        let url = format!(
            "{}?alt=sse",
            model_url(&self.base_url, model, "streamGenerateContent")
        );

        log::info!("Invoking streaming image model: {}", model);

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let mut body = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(next) = body.next().await {
                match next {
                    Ok(bytes) => {
                        let events = match decoder.feed(&bytes) {
                            Ok(events) => events,
                            Err(e) => {
                                log::error!("Aborting image stream: {}", e);
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        };
                        for event in events {
                            if tx.send(parse_chunk(&event)).await.is_err() {
                                return;
                            }
                        }
                        if decoder.is_done() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(AppError::Http(e))).await;
                        return;
                    }
                }
            }
            match decoder.finish() {
                Ok(Some(event)) => {
                    let _ = tx.send(parse_chunk(&event)).await;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn parse_chunk(event: &str) -> Result<GenerateContentResponse> {
    serde_json::from_str(event)
        .map_err(|e| AppError::Response(format!("malformed stream chunk: {}", e)))
}
