//! Externally pollable projections of an execution.

use serde::{Deserialize, Serialize};

use crate::core::{ExecutionId, ExecutionRecord, ExecutionStatus, ResultSummary, SubjectId, TaskId};
use crate::utils::{now_utc, Timestamp};

/// A lightweight handle onto an execution.
///
/// Many handles may reference the same execution; they all observe the
/// same progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// The handle's id.
    pub task_id: TaskId,
    /// The execution it points at.
    pub execution_id: ExecutionId,
    /// Progress in percent. Not guaranteed to be monotonic.
    pub progress_percent: u8,
    /// Time of the last progress or status change.
    pub last_update_at: Timestamp,
}

/// The value carried on an execution's progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current execution status.
    pub status: ExecutionStatus,
    /// Progress in percent.
    pub progress_percent: u8,
    /// When this update was produced.
    pub updated_at: Timestamp,
}

impl ProgressUpdate {
    pub(crate) fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            progress_percent: 0,
            updated_at: now_utc(),
        }
    }

    /// Returns true once the execution has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The polling view of a task.
///
/// `result_summary` is only present once the execution is terminal. A
/// `partially_completed` snapshot is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// The task the snapshot was requested for.
    pub task_id: TaskId,
    /// The underlying execution.
    pub execution_id: ExecutionId,
    /// The subject being assessed.
    pub subject_id: SubjectId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Progress in percent.
    pub progress_percent: u8,
    /// Result counts, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    /// Joined error summary, if any errors were recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the last progress or status change.
    pub last_update_at: Timestamp,
}

impl StatusSnapshot {
    pub(crate) fn from_record(task_id: TaskId, record: &ExecutionRecord, progress: ProgressUpdate) -> Self {
        let error = if record.error_summary().is_empty() {
            None
        } else {
            Some(record.error_summary().join("; "))
        };
        Self {
            task_id,
            execution_id: record.execution_id(),
            subject_id: record.subject_id().clone(),
            status: record.status(),
            progress_percent: progress.progress_percent,
            result_summary: record.is_terminal().then(|| record.summary()),
            error,
            last_update_at: progress.updated_at,
        }
    }

    /// Returns true if the execution is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
