use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{Config, MAX_IMAGE_BYTES},
    error::{AppError, Result},
    gemini::{ClientFactory, GenerativeModel},
    models::{GenerationRequest, GenerationResult, ImageUpload},
    styles::StyleStore,
};

use super::{build_parts, ImageGenerator, PromptRefiner};

/// Checks an uploaded reference image before any model is involved.
pub fn validate_image(image: &ImageUpload) -> Result<()> {
    if !image.mime_type.trim().starts_with("image/") {
        return Err(AppError::client_input("image must be of type image/*"));
    }
    if image.data.is_empty() {
        return Err(AppError::client_input("image file is empty"));
    }
    if image.data.len() > MAX_IMAGE_BYTES {
        return Err(AppError::client_input("image too large (>7MB)"));
    }
    Ok(())
}

/// The provider client owned by one request. Dropping it releases the client.
struct ClientScope {
    request_id: Uuid,
    client: Arc<dyn GenerativeModel>,
}

impl ClientScope {
    fn bind(request_id: Uuid, client: Arc<dyn GenerativeModel>) -> Self {
        log::debug!("[req:{}] provider client bound", request_id);
        Self { request_id, client }
    }

    fn client(&self) -> &dyn GenerativeModel {
        self.client.as_ref()
    }
}

impl Drop for ClientScope {
    fn drop(&mut self) {
        log::debug!("[req:{}] provider client released", self.request_id);
    }
}

/// Runs one request: validate, build a client, refine, merge, generate.
pub struct Orchestrator {
    styles: Arc<StyleStore>,
    factory: Arc<dyn ClientFactory>,
    refiner: PromptRefiner,
    generator: ImageGenerator,
}

impl Orchestrator {
    pub fn new(config: &Config, styles: Arc<StyleStore>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            styles,
            factory,
            refiner: PromptRefiner::new(config.gemini.text_model(), config.empty_output_policy),
            generator: ImageGenerator::new(
                config.gemini.image_model(),
                config.empty_output_policy,
            ),
        }
    }

    pub async fn handle(&self, request: GenerationRequest) -> Result<GenerationResult> {
        let request_id = Uuid::new_v4();

        let credential = request.credential.trim();
        if credential.is_empty() {
            return Err(AppError::client_input("api_key is required"));
        }
        if request.prompt.trim().is_empty() {
            return Err(AppError::client_input("prompt is required"));
        }
        if let Some(image) = &request.image {
            validate_image(image)?;
        }

        let client = self.factory.create(credential).map_err(|e| {
            log::warn!("[req:{}] provider client rejected: {}", request_id, e);
            AppError::ProviderAuth
        })?;
        let scope = ClientScope::bind(request_id, client);

        let outcome = self
            .run(&scope, &request)
            .await
            .map_err(AppError::into_generation_failure);

        match &outcome {
            Ok(result) => log::info!(
                "[req:{}] generated {} image(s), {} chars of text",
                request_id,
                result.images.len(),
                result.text.len()
            ),
            Err(e) => log::error!("[req:{}] {}", request_id, e),
        }

        drop(scope);
        outcome
    }

    async fn run(&self, scope: &ClientScope, request: &GenerationRequest) -> Result<GenerationResult> {
        let client = scope.client();
        let has_image = request.image.is_some();
        let style = self.styles.resolve(request.style_key());

        log::info!(
            "[req:{}] style '{}' ({}), reference image: {}",
            scope.request_id,
            style.key,
            style.label,
            has_image
        );

        let refined = self
            .refiner
            .refine(client, &request.prompt, &style, has_image)
            .await?;
        let final_prompt = self.styles.merge(&refined, &style.key);
        log::debug!("[req:{}] final prompt: {}", scope.request_id, final_prompt);

        let parts = build_parts(request.image.as_ref(), &final_prompt);
        self.generator.generate(client, parts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmptyOutputPolicy, GeminiConfig};
    use crate::gemini::ContentStream;
    use crate::models::{GenerateContentRequest, GenerateContentResponse};
    use crate::pipeline::testing::{
        image_chunk, request_text, text_response, ScriptedFactory, ScriptedModel,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    fn config() -> Config {
        Config::new().with_gemini(GeminiConfig::new().with_models("text-model", "image-model"))
    }

    fn styles() -> Arc<StyleStore> {
        Arc::new(StyleStore::new().with_style(
            "studio",
            "Studio",
            "Seamless white backdrop. {user_prompt}",
        ))
    }

    fn orchestrator(factory: Arc<ScriptedFactory>) -> Orchestrator {
        Orchestrator::new(&config(), styles(), factory)
    }

    fn happy_model() -> ScriptedModel {
        ScriptedModel::new()
            .reply_text(Ok(text_response("Red sports car on a beach, 35mm, golden hour.")))
            .reply_stream(Ok(vec![
                Ok(text_response("Here you go.")),
                Ok(image_chunk("image/png", "AQID")),
            ]))
    }

    #[test]
    fn test_validate_image() {
        let ok = ImageUpload {
            mime_type: "image/png".into(),
            data: vec![0; MAX_IMAGE_BYTES],
        };
        assert!(validate_image(&ok).is_ok());

        let cases = [
            ("text/plain", vec![1], "image must be of type image/*"),
            ("image/png", vec![], "image file is empty"),
            ("image/png", vec![0; MAX_IMAGE_BYTES + 1], "image too large (>7MB)"),
        ];
        for (mime, data, reason) in cases {
            let err = validate_image(&ImageUpload {
                mime_type: mime.into(),
                data,
            })
            .unwrap_err();
            assert!(matches!(err, AppError::ClientInput(ref msg) if msg == reason));
        }
    }

    #[tokio::test]
    async fn test_end_to_end_without_style() {
        let factory = Arc::new(ScriptedFactory::new(happy_model()));
        let orchestrator = orchestrator(factory.clone());

        let result = orchestrator
            .handle(GenerationRequest::new("red sports car on a beach", " key-1 ").with_style("none"))
            .await
            .unwrap();

        assert_eq!(result.text, "Here you go.");
        assert_eq!(result.images.len(), 1);
        assert!(result.images[0].data_url.starts_with("data:image/"));

        let text_calls = factory.model.text_calls.lock().unwrap();
        assert!(request_text(&text_calls[0])[1].ends_with("red sports car on a beach"));
        let stream_calls = factory.model.stream_calls.lock().unwrap();
        let generate_call = &stream_calls[0];
        assert_eq!(
            request_text(generate_call),
            vec!["Red sports car on a beach, 35mm, golden hour.".to_string()]
        );
        assert_eq!(factory.credentials(), vec!["key-1".to_string()]);
        assert_eq!(factory.live_clients(), 0);
    }

    #[tokio::test]
    async fn test_style_template_is_merged() {
        let factory = Arc::new(ScriptedFactory::new(happy_model()));
        orchestrator(factory.clone())
            .handle(
                GenerationRequest::new("red car", "key")
                    .with_style("studio")
                    .with_image(vec![9, 9, 9], "image/jpeg"),
            )
            .await
            .unwrap();

        let text_calls = factory.model.text_calls.lock().unwrap();
        let instruction = &request_text(&text_calls[0])[0];
        assert!(instruction.contains("Match this style: Studio"));
        assert!(instruction.contains("image EDITING"));

        let stream_calls = factory.model.stream_calls.lock().unwrap();
        let generate_call = &stream_calls[0];
        let parts = &generate_call.contents[0].parts;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].inline_data.is_some());
        assert_eq!(
            parts[1].text.as_deref(),
            Some("Seamless white backdrop. Red sports car on a beach, 35mm, golden hour.")
        );
    }

    #[tokio::test]
    async fn test_blank_credential_never_builds_a_client() {
        for credential in ["", "   \t"] {
            let factory = Arc::new(ScriptedFactory::new(happy_model()));
            let err = orchestrator(factory.clone())
                .handle(GenerationRequest::new("red car", credential))
                .await
                .unwrap_err();

            assert!(matches!(err, AppError::ClientInput(ref msg) if msg == "api_key is required"));
            assert!(factory.credentials().is_empty());
        }
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let factory = Arc::new(ScriptedFactory::new(happy_model()));
        let err = orchestrator(factory.clone())
            .handle(GenerationRequest::new("  ", "key"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ClientInput(ref msg) if msg == "prompt is required"));
        assert!(factory.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_bad_images_are_rejected_before_any_model_call() {
        let uploads = [
            (vec![0u8; MAX_IMAGE_BYTES + 1], "image/png"),
            (vec![1, 2, 3], "text/plain"),
            (Vec::new(), "image/png"),
        ];
        for (data, mime) in uploads {
            let factory = Arc::new(ScriptedFactory::new(happy_model()));
            let err = orchestrator(factory.clone())
                .handle(GenerationRequest::new("red car", "key").with_image(data, mime))
                .await
                .unwrap_err();

            assert!(err.is_client_error());
            assert_eq!(factory.model.text_call_count(), 0);
            assert_eq!(factory.model.stream_call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_factory_failure_is_provider_auth() {
        struct Rejecting;
        impl ClientFactory for Rejecting {
            fn create(&self, _credential: &str) -> Result<Arc<dyn GenerativeModel>> {
                Err(AppError::Config("boom".into()))
            }
        }

        let orchestrator = Orchestrator::new(&config(), styles(), Arc::new(Rejecting));
        let err = orchestrator
            .handle(GenerationRequest::new("red car", "key"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProviderAuth));
        assert_eq!(err.to_string(), "Invalid api_key provided");
    }

    #[tokio::test]
    async fn test_generation_errors_are_wrapped_and_client_released() {
        let model = ScriptedModel::new()
            .reply_text(Ok(text_response("Refined.")))
            .reply_stream(Err(AppError::Api {
                status: 500,
                message: "internal".into(),
            }));
        let factory = Arc::new(ScriptedFactory::new(model));

        let err = orchestrator(factory.clone())
            .handle(GenerationRequest::new("red car", "key"))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Generation failed: Gemini API error (500): internal"
        );
        assert!(!err.is_client_error());
        assert_eq!(factory.live_clients(), 0);
    }

    #[tokio::test]
    async fn test_error_policy_surfaces_empty_refinement() {
        let model = ScriptedModel::new().reply_text(Ok(GenerateContentResponse::default()));
        let factory = Arc::new(ScriptedFactory::new(model));
        let config = config().with_empty_output_policy(EmptyOutputPolicy::Error);
        let orchestrator = Orchestrator::new(&config, styles(), factory.clone());

        let err = orchestrator
            .handle(GenerationRequest::new("red car", "key"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(factory.model.stream_call_count(), 0);
    }

    #[tokio::test]
    async fn test_traces_never_carry_the_credential() {
        const SECRET: &str = "AIzaSy-car-pics-secret-0042";

        for model in [
            happy_model(),
            ScriptedModel::new()
                .reply_text(Err(AppError::Response("down".into())))
                .reply_text(Err(AppError::Response("still down".into())))
                .reply_stream(Err(AppError::Api {
                    status: 500,
                    message: "internal".into(),
                })),
        ] {
            crate::trace::captured::take();
            let factory = Arc::new(ScriptedFactory::new(model));
            let _ = orchestrator(factory.clone())
                .handle(
                    GenerationRequest::new("red sports car on a beach", SECRET)
                        .with_style("studio")
                        .with_image(vec![1, 2, 3], "image/png"),
                )
                .await;
            assert_eq!(factory.credentials(), vec![SECRET.to_string()]);

            let records = crate::trace::captured::take();
            let names: Vec<String> = records
                .iter()
                .map(|json| {
                    let value: serde_json::Value = serde_json::from_str(json).unwrap();
                    value["name"].as_str().unwrap().to_string()
                })
                .collect();
            assert_eq!(names, vec!["car-pics.refine", "car-pics.generate"]);
            for json in &records {
                assert!(!json.contains(SECRET));
            }
        }
    }

    /// Answers with the credential it was built for, after a pause that lets
    /// concurrent requests interleave.
    struct EchoModel {
        credential: String,
    }

    #[async_trait]
    impl GenerativeModel for EchoModel {
        async fn generate_content(
            &self,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(text_response(&format!("refined for {}", self.credential)))
        }

        async fn stream_generate_content(
            &self,
            _model: &str,
            request: &GenerateContentRequest,
        ) -> Result<ContentStream> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let prompt = request_text(request).join(" ");
            let chunks = vec![Ok(text_response(&format!(
                "{} via {}",
                prompt, self.credential
            )))];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct EchoFactory;

    impl ClientFactory for EchoFactory {
        fn create(&self, credential: &str) -> Result<Arc<dyn GenerativeModel>> {
            Ok(Arc::new(EchoModel {
                credential: credential.to_string(),
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_keep_their_own_client() {
        let orchestrator = Arc::new(Orchestrator::new(&config(), styles(), Arc::new(EchoFactory)));

        let a = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle(GenerationRequest::new("car A", "key-A"))
                    .await
            })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle(GenerationRequest::new("car B", "key-B"))
                    .await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.text, "refined for key-A via key-A");
        assert_eq!(b.text, "refined for key-B via key-B");
    }
}
