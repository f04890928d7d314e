//! The narrow interface to the persistence layer.
//!
//! The engine never talks to a database directly; everything it loads or
//! stores goes through [`ExternalCollaborators`].

mod memory;

pub use memory::{CostEntry, InMemoryCollaborators};

use async_trait::async_trait;

use crate::context::SubjectContext;
use crate::core::{ExecutionRecord, SubjectId};
use crate::errors::CollaboratorError;

/// Persistence operations consumed by the engine.
///
/// Implementations must be safe to call concurrently from many
/// executions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalCollaborators: Send + Sync {
    /// Loads the lead data for a subject.
    ///
    /// A failure here is fatal for the execution.
    async fn load_subject_context(&self, subject_id: &SubjectId) -> Result<SubjectContext, CollaboratorError>;

    /// Stores the payload of a successful component.
    async fn persist_component_result(
        &self,
        subject_id: &SubjectId,
        component_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError>;

    /// Stores the terminal execution record.
    async fn persist_final_status(
        &self,
        subject_id: &SubjectId,
        record: &ExecutionRecord,
    ) -> Result<(), CollaboratorError>;

    /// Appends to the cost ledger. Defaults to a no-op.
    async fn record_cost(
        &self,
        _subject_id: &SubjectId,
        _component_name: &str,
        _cost_units: f64,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
