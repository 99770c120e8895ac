//! Style store: named templates that frame a refined prompt.
//!
//! The store is read once at startup from a YAML file shaped like
//!
//! ```yaml
//! styles:
//!   golden_hour:
//!     label: Golden hour
//!     template: "Warm low sun, long shadows. {user_prompt}"
//! ```
//!
//! `{user_prompt}` marks where the refined directive goes; `{{` and `}}`
//! produce literal braces. Conversions and format specs
//! (`{user_prompt!s}`, `{user_prompt:>5}`) are not supported and make the
//! template fall back to concatenation.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::DEFAULT_STYLE;

const PLACEHOLDER: &str = "user_prompt";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StyleEntry {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StyleFile {
    #[serde(default)]
    styles: Option<HashMap<String, Option<StyleEntry>>>,
}

/// Outcome of a style lookup. An empty template means "do not merge".
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub key: String,
    pub label: String,
    pub template: String,
}

impl ResolvedStyle {
    pub fn has_template(&self) -> bool {
        !self.template.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleStore {
    styles: HashMap<String, StyleEntry>,
}

impl StyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::StyleStore(format!("failed to read {}: {}", path.display(), e))
        })?;
        let store = Self::from_yaml_str(&raw).map_err(|e| match e {
            AppError::StyleStore(msg) => {
                AppError::StyleStore(format!("failed to load {}: {}", path.display(), msg))
            }
            other => other,
        })?;

        log::info!("📚 Loaded {} style(s) from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }

        let file: Option<StyleFile> =
            serde_yaml::from_str(raw).map_err(|e| AppError::StyleStore(e.to_string()))?;

        let styles = file
            .and_then(|f| f.styles)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, entry)| entry.map(|entry| (key, entry)))
            .filter(|(_, entry)| *entry != StyleEntry::default())
            .collect();

        Ok(Self { styles })
    }

    pub fn with_style(
        mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.styles.insert(
            key.into(),
            StyleEntry {
                label: Some(label.into()),
                template: Some(template.into()),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&StyleEntry> {
        self.styles.get(normalize_key(key))
    }

    /// Looks a style up. Unknown keys resolve to themselves with no template.
    pub fn resolve(&self, key: &str) -> ResolvedStyle {
        let key = normalize_key(key);
        let entry = self.styles.get(key);

        let label = entry
            .and_then(|e| e.label.as_deref())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(key)
            .to_string();
        let template = entry
            .and_then(|e| e.template.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        ResolvedStyle {
            key: key.to_string(),
            label,
            template,
        }
    }

    /// Produces the final prompt. Never fails: a template that cannot be
    /// rendered is placed above the refined text instead.
    pub fn merge(&self, refined: &str, key: &str) -> String {
        let style = self.resolve(key);
        if !style.has_template() {
            return refined.to_string();
        }

        let refined = refined.trim();
        match render_template(&style.template, refined) {
            Some(prompt) => prompt,
            None => {
                log::warn!(
                    "Style '{}' template could not be rendered, concatenating instead",
                    style.key
                );
                format!("{}\n\n{}", style.template, refined)
                    .trim()
                    .to_string()
            }
        }
    }
}

fn normalize_key(key: &str) -> &str {
    let key = key.trim();
    if key.is_empty() {
        DEFAULT_STYLE
    } else {
        key
    }
}

/// Substitutes `value` for every `{user_prompt}` field. Returns `None` on
/// unbalanced braces or any other field name.
fn render_template(template: &str, value: &str) -> Option<String> {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return None,
                        Some(ch) => field.push(ch),
                    }
                }
                if field != PLACEHOLDER {
                    return None;
                }
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return None,
            _ => out.push(c),
        }
    }

    Some(out)
}
