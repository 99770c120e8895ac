use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_STYLE: &str = "none";

/// Reference image uploaded alongside the prompt.
#[derive(Clone, PartialEq)]
pub struct ImageUpload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One incoming request. Lives only for the duration of the call.
#[derive(Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<ImageUpload>,
    pub style: String,
    pub credential: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            style: DEFAULT_STYLE.to_string(),
            credential: credential.into(),
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_image(mut self, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.image = Some(ImageUpload {
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    /// Style key with blanks treated as "none".
    pub fn style_key(&self) -> &str {
        let key = self.style.trim();
        if key.is_empty() {
            DEFAULT_STYLE
        } else {
            key
        }
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("prompt", &self.prompt)
            .field("image", &self.image)
            .field("style", &self.style)
            .field("credential", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub base64: String,
    pub data_url: String,
}

impl GeneratedImage {
    pub fn new(mime_type: impl Into<String>, base64: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let base64 = base64.into();
        let data_url = format!("data:{};base64,{}", mime_type, base64);
        Self {
            mime_type,
            base64,
            data_url,
        }
    }
}

/// What the caller gets back: nothing about prompts or styles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub images: Vec<GeneratedImage>,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }
}
