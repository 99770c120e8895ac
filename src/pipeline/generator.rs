use futures::StreamExt;
use serde_json::json;

use crate::{
    config::EmptyOutputPolicy,
    error::{AppError, Result},
    gemini::GenerativeModel,
    logger,
    models::{
        Content, Fragment, GenerateContentRequest, GenerationAccumulator, GenerationResult,
        ImageUpload, Part,
    },
    trace::TraceRecord,
};

const RESPONSE_MODALITIES: &[&str] = &["IMAGE", "TEXT"];

/// Optional reference image first, then the final prompt.
pub fn build_parts(image: Option<&ImageUpload>, final_prompt: &str) -> Vec<Part> {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = image {
        parts.push(Part::from_bytes(&image.data, image.mime_type.as_str()));
    }
    parts.push(Part::text(final_prompt));
    parts
}

#[derive(Debug, Clone)]
pub struct ImageGenerator {
    model_name: String,
    policy: EmptyOutputPolicy,
}

impl ImageGenerator {
    pub fn new(model_name: impl Into<String>, policy: EmptyOutputPolicy) -> Self {
        Self {
            model_name: model_name.into(),
            policy,
        }
    }

    /// Streams the image model and folds the chunks into text and images.
    /// Any stream error aborts the whole call.
    pub async fn generate(
        &self,
        client: &dyn GenerativeModel,
        parts: Vec<Part>,
    ) -> Result<GenerationResult> {
        let prompt = parts
            .iter()
            .rev()
            .find_map(|p| p.text.clone())
            .unwrap_or_default();
        let has_image = parts.iter().any(|p| p.inline_data.is_some());

        let mut trace = TraceRecord::start(
            "car-pics.generate",
            &["car-pics", "image", self.model_name.as_str()],
        )
        .with_input("model_name", self.model_name.as_str())
        .with_input("final_prompt", prompt)
        .with_input("has_image", has_image);

        let request = GenerateContentRequest::new(vec![Content::user(parts)])
            .with_response_modalities(RESPONSE_MODALITIES);

        let outcome = self.collect(client, &request).await.and_then(|result| {
            if result.is_empty() && self.policy == EmptyOutputPolicy::Error {
                Err(AppError::Generation("image model returned no content".into()))
            } else {
                Ok(result)
            }
        });

        match &outcome {
            Ok(result) => {
                trace.set_output("text", result.text.as_str());
                trace.set_output("image_count", result.images.len());
                trace.set_output(
                    "images",
                    result
                        .images
                        .iter()
                        .map(|img| json!({"mime_type": img.mime_type, "base64_len": img.base64.len()}))
                        .collect::<Vec<_>>(),
                );
            }
            Err(e) => trace.set_error(e),
        }
        trace.emit();

        outcome
    }

    async fn collect(
        &self,
        client: &dyn GenerativeModel,
        request: &GenerateContentRequest,
    ) -> Result<GenerationResult> {
        let _timer = logger::timer("generate");
        let mut stream = client
            .stream_generate_content(&self.model_name, request)
            .await?;

        let mut accumulator = GenerationAccumulator::new();
        while let Some(chunk) = stream.next().await {
            if let Some(fragment) = Fragment::from_chunk(&chunk?)? {
                log::debug!(
                    "Received {} fragment",
                    match fragment {
                        Fragment::Text(_) => "text",
                        Fragment::Image { .. } => "image",
                    }
                );
                accumulator.push(fragment);
            }
        }

        Ok(accumulator.finish())
    }
}
