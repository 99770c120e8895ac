use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{AppError, Result};
use crate::models::{GenerateContentResponse, GeneratedImage, GenerationResult};

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// The useful payload of one streamed chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Image { data: Vec<u8>, mime_type: String },
}

impl Fragment {
    /// Classifies a chunk by the first part of its first candidate. Chunks
    /// without such a part, or whose part is empty, carry no fragment.
    pub fn from_chunk(chunk: &GenerateContentResponse) -> Result<Option<Self>> {
        let Some(part) = chunk.first_parts().first() else {
            return Ok(None);
        };

        if let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Some(Fragment::Text(text.to_string())));
        }

        match part.inline_data.as_ref().filter(|d| !d.data.is_empty()) {
            Some(inline) => {
                let data = STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| AppError::Response(format!("invalid inline image data: {}", e)))?;
                let mime_type = inline
                    .mime_type
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(DEFAULT_IMAGE_MIME)
                    .to_string();
                Ok(Some(Fragment::Image { data, mime_type }))
            }
            None => Ok(None),
        }
    }
}

/// Folds fragments into a `GenerationResult`, keeping arrival order.
#[derive(Debug, Default)]
pub struct GenerationAccumulator {
    text: String,
    images: Vec<GeneratedImage>,
}

impl GenerationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Text(text) => self.text.push_str(&text),
            Fragment::Image { data, mime_type } => {
                self.images
                    .push(GeneratedImage::new(mime_type, STANDARD.encode(data)));
            }
        }
    }

    pub fn finish(self) -> GenerationResult {
        GenerationResult {
            text: self.text.trim().to_string(),
            images: self.images,
        }
    }
}
