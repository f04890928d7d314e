//! Per-component outcome records.

use serde::{Deserialize, Serialize};

use super::ComponentStatus;
use crate::errors::{ComponentError, ComponentErrorKind};
use crate::utils::{elapsed_ms, now_utc, Timestamp};

/// What a component returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutput {
    /// Opaque data produced by the component.
    pub payload: serde_json::Value,
    /// Cost units consumed by the call (API credits, tokens, ...).
    #[serde(default)]
    pub cost_units: f64,
}

impl ComponentOutput {
    /// Creates an output with zero cost.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            cost_units: 0.0,
        }
    }

    /// Sets the cost units.
    #[must_use]
    pub fn with_cost(mut self, cost_units: f64) -> Self {
        self.cost_units = cost_units;
        self
    }
}

/// The outcome record of one component's execution for one subject.
///
/// Built once by the runner (or the engine, for skips) and never modified
/// after it is recorded on an [`ExecutionRecord`](super::ExecutionRecord).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    /// Name of the component.
    pub component_name: String,
    /// Terminal status.
    pub status: ComponentStatus,
    /// When the first attempt started (or when the skip was decided).
    pub started_at: Timestamp,
    /// When the last attempt finished.
    pub finished_at: Timestamp,
    /// Wall-clock duration in milliseconds, retries and backoff included.
    pub duration_ms: u64,
    /// Data produced by the component, on success.
    pub payload: Option<serde_json::Value>,
    /// Last error detail, when not successful.
    pub error_detail: Option<String>,
    /// Classification of the last error.
    pub error_kind: Option<ComponentErrorKind>,
    /// Cost units consumed.
    pub cost_units: f64,
    /// Number of invocations made (0 for skipped components).
    pub attempts: u32,
}

impl ComponentResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(
        component_name: impl Into<String>,
        started_at: Timestamp,
        attempts: u32,
        output: ComponentOutput,
    ) -> Self {
        let finished_at = now_utc();
        Self {
            component_name: component_name.into(),
            status: ComponentStatus::Success,
            started_at,
            finished_at,
            duration_ms: elapsed_ms(started_at, finished_at),
            payload: Some(output.payload),
            error_detail: None,
            error_kind: None,
            cost_units: output.cost_units.max(0.0),
            attempts,
        }
    }

    /// Creates a failure result from the last error seen.
    ///
    /// A timeout on the final attempt yields [`ComponentStatus::TimedOut`].
    #[must_use]
    pub fn failed(
        component_name: impl Into<String>,
        started_at: Timestamp,
        attempts: u32,
        error: &ComponentError,
    ) -> Self {
        let finished_at = now_utc();
        let status = if error.kind == ComponentErrorKind::Timeout {
            ComponentStatus::TimedOut
        } else {
            ComponentStatus::Failed
        };
        Self {
            component_name: component_name.into(),
            status,
            started_at,
            finished_at,
            duration_ms: elapsed_ms(started_at, finished_at),
            payload: None,
            error_detail: Some(error.message.clone()),
            error_kind: Some(error.kind),
            cost_units: 0.0,
            attempts,
        }
    }

    /// Creates a result for a component that was never invoked.
    #[must_use]
    pub fn skipped(component_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            component_name: component_name.into(),
            status: ComponentStatus::Skipped,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            payload: None,
            error_detail: Some(reason.into()),
            error_kind: Some(ComponentErrorKind::Dependency),
            cost_units: 0.0,
            attempts: 0,
        }
    }

    /// Returns true if the component succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the runner gave up because the execution was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ComponentErrorKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_result() {
        let started = now_utc();
        let output = ComponentOutput::new(json!({"score": 91})).with_cost(2.5);
        let result = ComponentResult::success("pagespeed", started, 1, output);

        assert!(result.is_success());
        assert_eq!(result.payload, Some(json!({"score": 91})));
        assert!((result.cost_units - 2.5).abs() < f64::EPSILON);
        assert!(result.finished_at >= result.started_at);
        assert!(result.error_detail.is_none());
    }

    #[test]
    fn test_negative_cost_clamped() {
        let output = ComponentOutput::new(json!(null)).with_cost(-3.0);
        let result = ComponentResult::success("seo", now_utc(), 1, output);
        assert!(result.cost_units.abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_result_keeps_last_error() {
        let err = ComponentError::transient("HTTP 503");
        let result = ComponentResult::failed("security_scan", now_utc(), 3, &err);

        assert_eq!(result.status, ComponentStatus::Failed);
        assert_eq!(result.error_detail.as_deref(), Some("HTTP 503"));
        assert_eq!(result.error_kind, Some(ComponentErrorKind::Transient));
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn test_timeout_maps_to_timed_out() {
        let err = ComponentError::timeout(std::time::Duration::from_millis(50));
        let result = ComponentResult::failed("screenshots", now_utc(), 2, &err);
        assert_eq!(result.status, ComponentStatus::TimedOut);
    }

    #[test]
    fn test_skipped_result() {
        let result = ComponentResult::skipped("visual_analysis", "dependency 'screenshots' failed");
        assert_eq!(result.status, ComponentStatus::Skipped);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.error_kind, Some(ComponentErrorKind::Dependency));
    }
}
