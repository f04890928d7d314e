//! Event payload emitted by the engine.

use serde::{Deserialize, Serialize};

use crate::core::{ExecutionId, SubjectId};
use crate::utils::{now_utc, Timestamp};

/// Event type names.
pub mod event_types {
    /// The execution was accepted and its context loaded.
    pub const EXECUTION_STARTED: &str = "execution.started";
    /// The execution reached a terminal status.
    pub const EXECUTION_FINISHED: &str = "execution.finished";
    /// Cancellation was requested.
    pub const EXECUTION_CANCELLED: &str = "execution.cancelled";
    /// A stage was dispatched.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage barrier was passed.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A component produced a result.
    pub const COMPONENT_COMPLETED: &str = "component.completed";
    /// A component was skipped for unmet dependencies.
    pub const COMPONENT_SKIPPED: &str = "component.skipped";
    /// The progress percentage of an execution changed.
    pub const PROGRESS: &str = "execution.progress";
}

/// One lifecycle event of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    /// Event type (see [`event_types`]).
    pub event_type: String,
    /// The execution the event belongs to.
    pub execution_id: ExecutionId,
    /// The subject being assessed.
    pub subject_id: SubjectId,
    /// Event-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was emitted.
    pub timestamp: Timestamp,
}

impl OrchestrationEvent {
    /// Creates an event without data.
    #[must_use]
    pub fn new(event_type: impl Into<String>, execution_id: ExecutionId, subject_id: SubjectId) -> Self {
        Self {
            event_type: event_type.into(),
            execution_id,
            subject_id,
            data: None,
            timestamp: now_utc(),
        }
    }

    /// Attaches event data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns true if the event type starts with `prefix`.
    #[must_use]
    pub fn is_a(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization_skips_empty_data() {
        let event = OrchestrationEvent::new(event_types::STAGE_STARTED, ExecutionId::new(), SubjectId::from("lead-1"));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "stage.started");
        assert_eq!(value["subject_id"], "lead-1");
        assert!(value.get("data").is_none());
        assert!(event.is_a("stage."));
    }

    #[test]
    fn test_with_data() {
        let event = OrchestrationEvent::new(event_types::PROGRESS, ExecutionId::new(), SubjectId::from("lead-1"))
            .with_data(json!({"progress_percent": 40}));
        assert_eq!(event.data, Some(json!({"progress_percent": 40})));
    }
}
