//! Run records for the two model-facing operations.
//!
//! Records only ever hold non-secret primitives: model names, style
//! metadata, prompt text, flags and output summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;
use uuid::Uuid;

pub const TRACE_TARGET: &str = "carpics::trace";

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub inputs: Map<String, Value>,
    pub outputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl TraceRecord {
    pub fn start(name: &str, tags: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            started_at: Utc::now(),
            inputs: Map::new(),
            outputs: Map::new(),
            error: None,
            duration_ms: None,
            started: Some(Instant::now()),
        }
    }

    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    pub fn set_output(&mut self, key: &str, value: impl Into<Value>) {
        self.outputs.insert(key.to_string(), value.into());
    }

    pub fn set_error(&mut self, error: impl ToString) {
        self.error = Some(error.to_string());
    }

    /// Stamps the duration and writes the record to the trace log target.
    pub fn emit(mut self) -> Self {
        if let Some(started) = self.started {
            self.duration_ms = Some(started.elapsed().as_millis() as u64);
        }
        let encoded = serde_json::to_string(&self);
        #[cfg(test)]
        let _ = encoded.as_deref().map(captured::record);
        match encoded {
            Ok(json) if self.error.is_some() => log::warn!(target: TRACE_TARGET, "{}", json),
            Ok(json) => log::info!(target: TRACE_TARGET, "{}", json),
            Err(e) => log::warn!(target: TRACE_TARGET, "failed to encode trace '{}': {}", self.name, e),
        }
        self
    }
}
