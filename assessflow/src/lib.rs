//! # Assessflow
//!
//! An orchestration engine for multi-stage website assessments of sales
//! leads.
//!
//! Each subject runs through a declarative pipeline of unreliable external
//! calls (performance audits, security scans, SEO lookups, screenshots,
//! vision analysis) with:
//!
//! - **Staged execution**: components in a stage run concurrently, stages
//!   are separated by a strict barrier
//! - **Bounded retries**: per-component timeouts and exponential backoff
//! - **Partial success**: one failing component degrades the outcome
//!   instead of aborting it
//! - **Live status**: pollable snapshots and progress streams per task
//! - **Cooperative cancellation** of in-flight executions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use assessflow::prelude::*;
//!
//! let engine = OrchestrationEngine::builder(lead_assessment_pipeline()?)
//!     .with_registry(registry)
//!     .with_collaborators(collaborators)
//!     .build()?;
//!
//! let task_id = engine.submit("lead-42").await?;
//! let snapshot = engine.get_status(task_id)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregator;
pub mod cancellation;
pub mod collaborators;
pub mod components;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod status;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregator::ResultAggregator;
    pub use crate::cancellation::CancellationToken;
    pub use crate::collaborators::{ExternalCollaborators, InMemoryCollaborators};
    pub use crate::components::{AsyncFnComponent, Component, ComponentRegistry, ComponentRunner};
    pub use crate::config::{EngineConfig, OrchestratorConfig};
    pub use crate::context::{ComponentContext, ComponentInputs, SubjectContext};
    pub use crate::core::{
        ComponentOutput, ComponentResult, ComponentStatus, ExecutionId, ExecutionRecord,
        ExecutionStatus, SubjectId, TaskId,
    };
    pub use crate::engine::{EngineBuilder, OrchestrationEngine};
    pub use crate::errors::{
        CollaboratorError, ComponentError, ComponentErrorKind, OrchestratorError,
        PipelineValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        lead_assessment_pipeline, ComponentDescriptor, PipelineBuilder, PipelineSpec, StageSpec,
    };
    pub use crate::status::{StatusSnapshot, StatusStore, TaskHandle};
}
