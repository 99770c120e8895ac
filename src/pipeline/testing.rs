//! Scripted provider doubles shared by the pipeline tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{AppError, Result};
use crate::gemini::{ClientFactory, ContentStream, GenerativeModel};
use crate::models::{GenerateContentRequest, GenerateContentResponse};

type StreamReply = Result<Vec<Result<GenerateContentResponse>>>;

#[derive(Default)]
pub(crate) struct ScriptedModel {
    text_replies: Mutex<VecDeque<Result<GenerateContentResponse>>>,
    stream_replies: Mutex<VecDeque<StreamReply>>,
    pub text_calls: Mutex<Vec<GenerateContentRequest>>,
    pub stream_calls: Mutex<Vec<GenerateContentRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_text(self, reply: Result<GenerateContentResponse>) -> Self {
        self.text_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn reply_stream(self, reply: StreamReply) -> Self {
        self.stream_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn text_call_count(&self) -> usize {
        self.text_calls.lock().unwrap().len()
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.text_calls.lock().unwrap().push(request.clone());
        self.text_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Response("no scripted text reply".into())))
    }

    async fn stream_generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ContentStream> {
        self.stream_calls.lock().unwrap().push(request.clone());
        let chunks = self
            .stream_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Per-request handle around a shared script, so tests can watch it being dropped.
struct Handle(Arc<ScriptedModel>);

#[async_trait]
impl GenerativeModel for Handle {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.0.generate_content(model, request).await
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ContentStream> {
        self.0.stream_generate_content(model, request).await
    }
}

pub(crate) struct ScriptedFactory {
    pub model: Arc<ScriptedModel>,
    issued: Mutex<Vec<(String, Weak<dyn GenerativeModel>)>>,
}

impl ScriptedFactory {
    pub fn new(model: ScriptedModel) -> Self {
        Self {
            model: Arc::new(model),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn credentials(&self) -> Vec<String> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn live_clients(&self) -> usize {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_some())
            .count()
    }
}

impl ClientFactory for ScriptedFactory {
    fn create(&self, credential: &str) -> Result<Arc<dyn GenerativeModel>> {
        let handle: Arc<dyn GenerativeModel> = Arc::new(Handle(self.model.clone()));
        self.issued
            .lock()
            .unwrap()
            .push((credential.to_string(), Arc::downgrade(&handle)));
        Ok(handle)
    }
}

pub(crate) fn text_response(text: &str) -> GenerateContentResponse {
    serde_json::from_value(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
    .unwrap()
}

pub(crate) fn image_chunk(mime_type: &str, data: &str) -> GenerateContentResponse {
    serde_json::from_value(json!({
        "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": mime_type, "data": data}}]}}]
    }))
    .unwrap()
}

pub(crate) fn request_text(request: &GenerateContentRequest) -> Vec<String> {
    request
        .contents
        .iter()
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.clone())
        .collect()
}
