//! Gemini `generateContent` wire types.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

/// A single content part. Gemini sends exactly one of `text` / `inline_data`
/// per part; `thought` marks reasoning output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn from_bytes(data: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: Some(mime_type.into()),
                data: STANDARD.encode(data),
            }),
            ..Default::default()
        }
    }

    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// `-1` lets the model pick its own budget.
    pub thinking_budget: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            generation_config: None,
        }
    }

    pub fn with_dynamic_thinking(mut self) -> Self {
        let config = self.generation_config.get_or_insert_with(Default::default);
        config.thinking_config = Some(ThinkingConfig {
            thinking_budget: -1,
        });
        self
    }

    pub fn with_response_modalities(mut self, modalities: &[&str]) -> Self {
        let config = self.generation_config.get_or_insert_with(Default::default);
        config.response_modalities = Some(modalities.iter().map(|m| m.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    pub fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Answer text of the first candidate, reasoning parts excluded.
    pub fn text(&self) -> String {
        self.first_parts()
            .iter()
            .filter(|p| !p.is_thought())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    /// Every text fragment of the first candidate, reasoning parts included.
    pub fn all_text(&self) -> String {
        self.first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = GenerateContentRequest::new(vec![Content::user(vec![
            Part::from_bytes(b"\x89PNG", "image/png"),
            Part::text("make it dusk"),
        ])])
        .with_response_modalities(&["IMAGE", "TEXT"]);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}},
                        {"text": "make it dusk"}
                    ]
                }],
                "generationConfig": {"responseModalities": ["IMAGE", "TEXT"]}
            })
        );
    }

    #[test]
    fn test_thinking_config_serializes_budget() {
        let request = GenerateContentRequest::new(vec![]).with_dynamic_thinking();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["generationConfig"],
            json!({"thinkingConfig": {"thinkingBudget": -1}})
        );
    }

    #[test]
    fn test_text_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "planning...", "thought": true},
                    {"text": "Low-angle shot"},
                    {"text": " at golden hour."}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 12}
        }))
        .unwrap();

        assert_eq!(response.text(), "Low-angle shot at golden hour.");
        assert_eq!(
            response.all_text(),
            "planning...Low-angle shot at golden hour."
        );
    }

    #[test]
    fn test_missing_candidates_is_empty() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.first_parts().is_empty());
        assert_eq!(response.text(), "");
    }
}
