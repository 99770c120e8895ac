use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid request fields. The message is shown to the caller as is.
    #[error("{0}")]
    ClientInput(String),
    /// The submitted credential could not be used to build a provider client.
    #[error("Invalid api_key provided")]
    ProviderAuth,
    #[error("Generation failed: {0}")]
    Generation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Style store error: {0}")]
    StyleStore(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Response error: {0}")]
    Response(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn client_input(msg: impl Into<String>) -> Self {
        AppError::ClientInput(msg.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::ClientInput(_) | AppError::ProviderAuth)
    }

    /// Wraps anything that is not already a client-facing error into a
    /// `Generation` failure, keeping the underlying text.
    pub fn into_generation_failure(self) -> Self {
        match self {
            AppError::ClientInput(_) | AppError::ProviderAuth | AppError::Generation(_) => self,
            other => AppError::Generation(other.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
