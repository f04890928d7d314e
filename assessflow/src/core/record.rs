//! The authoritative record of one orchestration run.

use serde::{Deserialize, Serialize};

use super::{ComponentResult, ComponentStatus, ExecutionId, ExecutionStatus, SubjectId};
use crate::errors::{OrchestratorError, Result};
use crate::utils::{now_utc, Timestamp};

/// The complete record of one orchestration run.
///
/// Mutated only by the run that owns it; once terminal every mutator
/// returns [`OrchestratorError::InvalidTransition`]. Readers observe it
/// through `Arc` snapshots published by the status store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    execution_id: ExecutionId,
    subject_id: SubjectId,
    status: ExecutionStatus,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
    results: Vec<ComponentResult>,
    success_rate: f64,
    total_cost_units: f64,
    error_summary: Vec<String>,
}

impl ExecutionRecord {
    /// Creates a pending record for a subject.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            subject_id,
            status: ExecutionStatus::Pending,
            started_at: now_utc(),
            finished_at: None,
            results: Vec::new(),
            success_rate: 0.0,
            total_cost_units: 0.0,
            error_summary: Vec::new(),
        }
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the subject id.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Returns true once the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns when the record was created.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns when the record reached a terminal status.
    #[must_use]
    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// Returns results in the order they were recorded.
    #[must_use]
    pub fn results(&self) -> &[ComponentResult] {
        &self.results
    }

    /// Returns the result for a component, if recorded.
    #[must_use]
    pub fn result(&self, component: &str) -> Option<&ComponentResult> {
        self.results.iter().find(|r| r.component_name == component)
    }

    /// Returns the success rate computed at finalization.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Returns the summed cost of all recorded results.
    #[must_use]
    pub fn total_cost_units(&self) -> f64 {
        self.total_cost_units
    }

    /// Returns the error summary entries.
    #[must_use]
    pub fn error_summary(&self) -> &[String] {
        &self.error_summary
    }

    /// Returns true if the error summary carries the cancellation marker.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.error_summary.iter().any(|e| e == CANCELLED_MARKER)
    }

    /// Moves the record from `pending` to `running`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not pending.
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(ExecutionStatus::Running)
    }

    /// Appends a component result.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not running or the component
    /// already has a result.
    pub fn record_result(&mut self, result: ComponentResult) -> Result<()> {
        if self.status != ExecutionStatus::Running {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to: ExecutionStatus::Running,
            });
        }
        if self.result(&result.component_name).is_some() {
            return Err(OrchestratorError::DuplicateResult(result.component_name));
        }
        self.total_cost_units += result.cost_units;
        self.results.push(result);
        Ok(())
    }

    /// Appends an entry to the error summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal.
    pub fn push_error(&mut self, message: impl Into<String>) -> Result<()> {
        if self.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        self.error_summary.push(message.into());
        Ok(())
    }

    /// Sets the terminal status and success rate. Called exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if `status` is not terminal or the transition is
    /// illegal from the current status.
    pub fn finalize(&mut self, status: ExecutionStatus, success_rate: f64) -> Result<()> {
        if !status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self.finished_at = Some(now_utc());
        Ok(())
    }

    /// Counts results by status.
    #[must_use]
    pub fn summary(&self) -> ResultSummary {
        let mut summary = ResultSummary {
            total: self.results.len(),
            success_rate: self.success_rate,
            total_cost_units: self.total_cost_units,
            ..ResultSummary::default()
        };
        for result in &self.results {
            match result.status {
                ComponentStatus::Success => summary.succeeded += 1,
                ComponentStatus::Failed => summary.failed += 1,
                ComponentStatus::TimedOut => summary.timed_out += 1,
                ComponentStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    fn transition(&mut self, to: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Error summary entry written when an execution is cancelled.
pub const CANCELLED_MARKER: &str = "cancelled";

/// Result counts exposed to polling clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Number of recorded results.
    pub total: usize,
    /// Successful components.
    pub succeeded: usize,
    /// Failed components.
    pub failed: usize,
    /// Components whose final attempt timed out.
    pub timed_out: usize,
    /// Components skipped for unmet dependencies.
    pub skipped: usize,
    /// Success rate (0 until finalized).
    pub success_rate: f64,
    /// Total cost units.
    pub total_cost_units: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ComponentOutput;
    use crate::errors::ComponentError;
    use serde_json::json;

    fn ok(name: &str, cost: f64) -> ComponentResult {
        ComponentResult::success(name, now_utc(), 1, ComponentOutput::new(json!({})).with_cost(cost))
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = ExecutionRecord::new(SubjectId::from("lead-1"));
        assert_eq!(record.status(), ExecutionStatus::Pending);
        assert!(record.results().is_empty());
        assert!(record.finished_at().is_none());
    }

    #[test]
    fn test_results_require_running() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        assert!(record.record_result(ok("a", 0.0)).is_err());

        record.mark_running().unwrap();
        record.record_result(ok("a", 1.0)).unwrap();
        record.record_result(ok("b", 2.0)).unwrap();

        assert_eq!(record.results().len(), 2);
        assert_eq!(record.results()[0].component_name, "a");
        assert!((record.total_cost_units() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicate_result_rejected() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        record.record_result(ok("a", 0.0)).unwrap();

        let err = record.record_result(ok("a", 0.0)).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateResult(name) if name == "a"));
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        record.finalize(ExecutionStatus::Completed, 1.0).unwrap();

        let frozen = record.clone();
        assert!(record.record_result(ok("late", 0.0)).is_err());
        assert!(record.push_error("late").is_err());
        assert!(record.finalize(ExecutionStatus::Failed, 0.0).is_err());
        assert!(record.mark_running().is_err());
        assert_eq!(record, frozen);
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let mut record = ExecutionRecord::new(SubjectId::from("missing"));
        record.push_error("subject not found").unwrap();
        record.finalize(ExecutionStatus::Failed, 0.0).unwrap();

        assert!(record.is_terminal());
        assert!(record.finished_at().is_some());
    }

    #[test]
    fn test_finalize_rejects_non_terminal_status() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        assert!(record.finalize(ExecutionStatus::Running, 0.0).is_err());
    }

    #[test]
    fn test_summary_counts() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        record.record_result(ok("a", 0.0)).unwrap();
        record
            .record_result(ComponentResult::failed("b", now_utc(), 3, &ComponentError::transient("x")))
            .unwrap();
        record.record_result(ComponentResult::skipped("c", "b failed")).unwrap();

        let summary = record.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_cancelled_marker() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        record.push_error(CANCELLED_MARKER).unwrap();
        assert!(record.was_cancelled());
    }
}
