//! Core domain model types.
//!
//! This module contains the fundamental types shared by every layer:
//! - Identifier newtypes for subjects, executions and tasks
//! - Component and execution status enums
//! - Component results and the execution record

mod ids;
mod record;
mod result;
mod status;

pub use ids::{ExecutionId, SubjectId, TaskId};
pub use record::{ExecutionRecord, ResultSummary, CANCELLED_MARKER};
pub use result::{ComponentOutput, ComponentResult};
pub use status::{ComponentStatus, ExecutionStatus};
