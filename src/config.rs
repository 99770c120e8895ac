use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::logger::{LogLevel, LoggerConfig};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_PROMPTS_PATH: &str = "prompts.yml";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Upper bound for an uploaded reference image.
pub const MAX_IMAGE_BYTES: usize = 7 * 1024 * 1024;

/// Browser origins allowed to call the endpoint (local frontend dev server).
pub const CORS_ALLOWED_ORIGINS: &[&str] = &["http://localhost:5173", "http://127.0.0.1:5173"];

/// What to do when a model call produces no usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOutputPolicy {
    /// Refiner falls back to the user's prompt, generator returns an empty result.
    #[default]
    Fallback,
    /// Empty output is reported as a generation failure.
    Error,
}

impl FromStr for EmptyOutputPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(EmptyOutputPolicy::Fallback),
            "error" => Ok(EmptyOutputPolicy::Error),
            other => Err(AppError::Config(format!(
                "unknown EMPTY_OUTPUT_POLICY '{}' (expected 'fallback' or 'error')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeminiConfig {
    pub base_url: Option<String>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl GeminiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_models(
        mut self,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> Self {
        self.text_model = Some(text_model.into());
        self.image_model = Some(image_model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn base_url(&self) -> &str {
        non_blank(&self.base_url).unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn text_model(&self) -> &str {
        non_blank(&self.text_model).unwrap_or(DEFAULT_TEXT_MODEL)
    }

    pub fn image_model(&self) -> &str {
        non_blank(&self.image_model).unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub prompts_path: Option<String>,
    pub empty_output_policy: EmptyOutputPolicy,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub json_logs: bool,
    pub gemini: GeminiConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match var("PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| AppError::Config(format!("invalid PORT '{}'", raw)))?,
            ),
            None => None,
        };
        let timeout_secs = match var("GEMINI_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                AppError::Config(format!("invalid GEMINI_TIMEOUT_SECS '{}'", raw))
            })?),
            None => None,
        };
        let empty_output_policy = match var("EMPTY_OUTPUT_POLICY") {
            Some(raw) => raw.parse()?,
            None => EmptyOutputPolicy::default(),
        };
        let json_logs = var("LOG_FORMAT").map_or(false, |val| val.trim() == "json");

        Ok(Config {
            host: var("HOST"),
            port,
            prompts_path: var("PROMPTS_PATH"),
            empty_output_policy,
            log_level: var("LOG_LEVEL"),
            log_file: var("LOG_FILE"),
            json_logs,
            gemini: GeminiConfig {
                base_url: var("GEMINI_BASE_URL"),
                text_model: var("GEMINI_TEXT_MODEL"),
                image_model: var("GEMINI_IMAGE_MODEL"),
                timeout_secs,
            },
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_prompts_path(mut self, path: impl Into<String>) -> Self {
        self.prompts_path = Some(path.into());
        self
    }

    pub fn with_empty_output_policy(mut self, policy: EmptyOutputPolicy) -> Self {
        self.empty_output_policy = policy;
        self
    }

    pub fn with_gemini(mut self, config: GeminiConfig) -> Self {
        self.gemini = config;
        self
    }

    pub fn host(&self) -> &str {
        non_blank(&self.host).unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn prompts_path(&self) -> &str {
        non_blank(&self.prompts_path).unwrap_or(DEFAULT_PROMPTS_PATH)
    }

    pub fn logger_config(&self) -> LoggerConfig {
        let base = if self.json_logs {
            LoggerConfig::production()
        } else {
            LoggerConfig::development()
        };
        let base = match non_blank(&self.log_file) {
            Some(path) => base.with_file_output(path),
            None => base,
        };
        match self.log_level.as_deref().and_then(LogLevel::parse) {
            Some(level) => base.with_level(level),
            None => base,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
