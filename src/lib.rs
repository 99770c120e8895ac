pub mod config;
pub mod error;
pub mod gemini;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod styles;
pub mod trace;

pub use config::{Config, EmptyOutputPolicy, GeminiConfig};
pub use error::{AppError, Result};
pub use gemini::{ClientFactory, GeminiClient, GeminiClientFactory, GenerativeModel};
pub use models::*;
pub use pipeline::{ImageGenerator, Orchestrator, PromptRefiner};
pub use styles::{ResolvedStyle, StyleStore};
