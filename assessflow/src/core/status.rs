//! Component and execution status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of one component for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// The component produced a payload.
    Success,
    /// Every attempt failed, or the error was permanent.
    Failed,
    /// The final attempt exceeded its deadline.
    TimedOut,
    /// Not invoked because an upstream dependency did not succeed.
    Skipped,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl ComponentStatus {
    /// Returns true if the component succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the component was dispatched and did not succeed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    /// Returns true if the component was actually dispatched.
    #[must_use]
    pub fn was_dispatched(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Lifecycle status of an execution record.
///
/// `pending → running → {completed | partially_completed | failed}`;
/// `pending → failed` is allowed when the subject context cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted, nothing dispatched yet.
    #[default]
    Pending,
    /// At least one stage has been dispatched.
    Running,
    /// Every dispatched component succeeded.
    Completed,
    /// Enough components succeeded to meet the partial-success threshold.
    PartiallyCompleted,
    /// Fatal error, cancellation, or success rate below threshold.
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted | Self::Failed)
    }

    /// Returns true if the transition `self → to` is legal.
    #[must_use]
    pub fn can_transition(&self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Running | Self::Failed),
            Self::Running => to.is_terminal(),
            Self::Completed | Self::PartiallyCompleted | Self::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_status_display() {
        assert_eq!(ComponentStatus::Success.to_string(), "success");
        assert_eq!(ComponentStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(ComponentStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_component_status_classification() {
        assert!(ComponentStatus::Success.is_success());
        assert!(ComponentStatus::TimedOut.is_failure());
        assert!(ComponentStatus::Failed.was_dispatched());
        assert!(!ComponentStatus::Skipped.was_dispatched());
        assert!(!ComponentStatus::Skipped.is_failure());
    }

    #[test]
    fn test_execution_status_is_terminal() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::PartiallyCompleted.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_execution_status_transitions() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition(Running));
        assert!(Pending.can_transition(Failed));
        assert!(!Pending.can_transition(Completed));
        assert!(Running.can_transition(PartiallyCompleted));
        assert!(!Running.can_transition(Pending));
        assert!(!Completed.can_transition(Failed));
        assert!(!Failed.can_transition(Running));
    }

    #[test]
    fn test_execution_status_serialize() {
        let json = serde_json::to_string(&ExecutionStatus::PartiallyCompleted).unwrap();
        assert_eq!(json, r#""partially_completed""#);

        let parsed: ExecutionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ExecutionStatus::PartiallyCompleted);
    }
}
