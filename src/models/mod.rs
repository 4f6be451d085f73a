use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One extracted item: a named-field mapping whose shape is dictated by the
/// run's field schema (e.g. a review or a car listing).
pub type Record = serde_json::Map<String, Value>;

/// A fully hydrated page capture. Immutable once produced.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub url: String,
    pub html: String,
    pub captured_at: DateTime<Utc>,
}

impl RenderedDocument {
    pub fn new(url: impl Into<String>, html: String) -> Self {
        Self {
            url: url.into(),
            html,
            captured_at: Utc::now(),
        }
    }
}

/// Per-step execution metadata reported by the extraction service after a
/// run. Cost-bearing fields inside `metadata` are summed by the cost
/// projector and then discarded; steps are never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStep {
    pub name: String,
    pub metadata: serde_json::Map<String, Value>,
}

impl ExecutionStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
