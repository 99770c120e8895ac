use crate::{
    config::EmptyOutputPolicy,
    error::{AppError, Result},
    gemini::GenerativeModel,
    logger,
    models::{Content, GenerateContentRequest, GenerateContentResponse, Part},
    styles::ResolvedStyle,
    trace::TraceRecord,
};

/// Rewrites the user's request into a short photography directive with the
/// text model.
#[derive(Debug, Clone)]
pub struct PromptRefiner {
    model_name: String,
    policy: EmptyOutputPolicy,
}

impl PromptRefiner {
    pub fn new(model_name: impl Into<String>, policy: EmptyOutputPolicy) -> Self {
        Self {
            model_name: model_name.into(),
            policy,
        }
    }

    /// Returns a non-empty directive. Under `EmptyOutputPolicy::Fallback`
    /// the trimmed user prompt is returned whenever the model gives nothing
    /// usable or both attempts fail.
    pub async fn refine(
        &self,
        client: &dyn GenerativeModel,
        user_prompt: &str,
        style: &ResolvedStyle,
        has_image: bool,
    ) -> Result<String> {
        let user_prompt = user_prompt.trim();
        let mut trace = TraceRecord::start(
            "car-pics.refine",
            &["car-pics", "refine", self.model_name.as_str()],
        )
        .with_input("model_name", self.model_name.as_str())
        .with_input("user_prompt", user_prompt)
        .with_input("style_key", style.key.as_str())
        .with_input("style_label", style.label.as_str())
        .with_input("style_desc", style.template.as_str())
        .with_input("has_image", has_image);

        let request = build_request(user_prompt, style, has_image);
        let refined = match self.call(client, request).await {
            Ok(response) => extract_text(&response),
            Err(e) if self.policy == EmptyOutputPolicy::Fallback => {
                log::warn!("Prompt refinement failed, using the prompt as typed: {}", e);
                trace.set_error(&e);
                String::new()
            }
            Err(e) => {
                trace.set_error(&e);
                trace.emit();
                return Err(e);
            }
        };

        let refined = match (refined.is_empty(), self.policy) {
            (false, _) => refined,
            (true, EmptyOutputPolicy::Fallback) => user_prompt.to_string(),
            (true, EmptyOutputPolicy::Error) => {
                let err = AppError::Generation("text model returned an empty refinement".into());
                trace.set_error(&err);
                trace.emit();
                return Err(err);
            }
        };

        trace.set_output("refined", refined.as_str());
        trace.emit();
        Ok(refined)
    }

    /// Dynamic thinking first, then one plain attempt if that mode is rejected.
    async fn call(
        &self,
        client: &dyn GenerativeModel,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let _timer = logger::timer("refine");
        let thinking = request.clone().with_dynamic_thinking();
        match client.generate_content(&self.model_name, &thinking).await {
            Ok(response) => Ok(response),
            Err(e) => {
                log::warn!(
                    "Refinement with thinking failed on {}, retrying without it: {}",
                    self.model_name,
                    e
                );
                client.generate_content(&self.model_name, &request).await
            }
        }
    }
}

pub fn build_instruction(style_label: &str, style_desc: &str, has_image: bool) -> String {
    let task = if has_image { "EDITING" } else { "GENERATION" };
    format!(
        "You are a prompt engineer for photo-style image {task}.\n\
         Rewrite the user's request as a concise directive (1-3 sentences) optimized for photography.\n\
         \n\
         Requirements:\n\
         - Keep the user's intent; do not add new subjects, brands, or people.\n\
         - Use concrete camera, lighting and composition terms when relevant (focal length, aperture, angle, time of day).\n\
         - Match this style: {style_label}. Use this style description as context:\n\
         ---\n\
         {style_desc}\n\
         ---\n\
         - If an input image is provided, phrase the request as an EDIT (change background, lighting or ambience) without altering the identity of the key subject.\n\
         - Avoid disclaimers, headings, lists, or quotes. Output only the refined directive."
    )
}

fn build_request(user_prompt: &str, style: &ResolvedStyle, has_image: bool) -> GenerateContentRequest {
    GenerateContentRequest::new(vec![Content::user(vec![
        Part::text(build_instruction(&style.label, &style.template, has_image)),
        Part::text(format!("User request:\n{}", user_prompt)),
    ])])
}

/// Answer text, else every text fragment of the first candidate, trimmed.
pub fn extract_text(response: &GenerateContentResponse) -> String {
    let primary = response.text();
    let text = if primary.trim().is_empty() {
        response.all_text()
    } else {
        primary
    };
    text.trim().to_string()
}
