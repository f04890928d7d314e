//! Per-invocation component context.

use std::sync::Arc;

use super::{ComponentInputs, SubjectContext};
use crate::core::{ExecutionId, SubjectId};

/// Everything a component sees when it is invoked.
///
/// Cheap to clone; the runner makes one copy per attempt.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    execution_id: ExecutionId,
    subject: Arc<SubjectContext>,
    inputs: Arc<ComponentInputs>,
    attempt: u32,
}

impl ComponentContext {
    /// Creates a context for the first attempt.
    #[must_use]
    pub fn new(execution_id: ExecutionId, subject: Arc<SubjectContext>, inputs: ComponentInputs) -> Self {
        Self {
            execution_id,
            subject,
            inputs: Arc::new(inputs),
            attempt: 1,
        }
    }

    /// Returns a copy for the given 1-based attempt number.
    #[must_use]
    pub(crate) fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
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
        self.subject.subject_id()
    }

    /// Returns the subject context.
    #[must_use]
    pub fn subject(&self) -> &SubjectContext {
        &self.subject
    }

    /// Returns the payloads of prior components.
    #[must_use]
    pub fn inputs(&self) -> &ComponentInputs {
        &self.inputs
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
