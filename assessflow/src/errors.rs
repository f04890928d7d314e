//! Error types for the assessment orchestration engine.
//!
//! Component-level failures are data, not errors: they are captured into
//! [`ComponentResult`](crate::core::ComponentResult) values and never escape
//! the engine's public API. The types here cover everything else: pipeline
//! validation, collaborator failures, configuration and lookup errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::core::{ExecutionStatus, SubjectId};

/// Convenience result alias for orchestration operations.
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

/// The main error type for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The subject context could not be loaded; the execution is aborted.
    #[error("Fatal context error for subject '{subject_id}': {source}")]
    FatalContext {
        /// The subject being assessed.
        subject_id: SubjectId,
        /// The collaborator failure.
        #[source]
        source: CollaboratorError,
    },

    /// No task handle is registered under the given id.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// No execution is registered under the given id.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// An execution record was asked to make an illegal state transition.
    #[error("Invalid execution transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: ExecutionStatus,
        /// Requested status.
        to: ExecutionStatus,
    },

    /// A component result was recorded twice for the same execution.
    #[error("Duplicate result for component '{0}'")]
    DuplicateResult(String),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A spawned execution task panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The components involved in the error.
    pub components: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            components: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the components involved.
    #[must_use]
    pub fn with_components(mut self, components: Vec<String>) -> Self {
        self.components = components;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected among component dependencies.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of components forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            components: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a component reads an input it did not declare.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Undeclared dependency: component '{component}' attempted to read '{key}' which is not in its depends_on set")]
pub struct UndeclaredDependencyError {
    /// The component attempting access.
    pub component: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(component: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            key: key.into(),
        }
    }
}

/// Retry classification of a component error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentErrorKind {
    /// Retrying may succeed (network failure, rate limit, 5xx...).
    #[default]
    Transient,
    /// Retrying cannot fix this (malformed input, unsupported subject...).
    Permanent,
    /// The attempt exceeded its deadline.
    Timeout,
    /// An upstream dependency did not succeed; the component was not invoked.
    Dependency,
    /// The execution was cancelled while the component was in flight.
    Cancelled,
}

impl ComponentErrorKind {
    /// Returns true if an attempt failing with this kind may be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl fmt::Display for ComponentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Timeout => write!(f, "timeout"),
            Self::Dependency => write!(f, "dependency"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error returned by a component invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ComponentError {
    /// Retry classification.
    pub kind: ComponentErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ComponentError {
    /// Creates a retryable error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ComponentErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates an error that must not be retried.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ComponentErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(after: std::time::Duration) -> Self {
        Self {
            kind: ComponentErrorKind::Timeout,
            message: format!("attempt timed out after {}ms", after.as_millis()),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            kind: ComponentErrorKind::Cancelled,
            message: "cancelled".to_string(),
        }
    }

    /// Returns true if the error may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<anyhow::Error> for ComponentError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(format!("{err:#}"))
    }
}

/// Errors reported by the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The subject does not exist.
    #[error("Subject not found: {0}")]
    NotFound(SubjectId),

    /// The backing store could not be reached.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write.
    #[error("Collaborator rejected request: {0}")]
    Rejected(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// The file path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is malformed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
