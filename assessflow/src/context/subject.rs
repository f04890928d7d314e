//! Subject (lead) context loaded from the persistence layer.

use serde::{Deserialize, Serialize};

use crate::core::SubjectId;

/// Lead data loaded once at the start of an execution.
///
/// The payload is opaque to the engine; components interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectContext {
    subject_id: SubjectId,
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

impl SubjectContext {
    /// Creates an empty context for a subject.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            data: serde_json::Map::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the subject id.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Returns a field by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns a string field by key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns all fields.
    #[must_use]
    pub fn data(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.data
    }
}
