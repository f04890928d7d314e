//! Declarative pipeline definitions.
//!
//! This module provides:
//! - Component descriptors, stages and the pipeline specification
//! - A fluent builder with validation
//! - Retry backoff policies
//! - The built-in lead assessment pipeline

pub mod assessment;
mod builder;
mod retry;
mod spec;

pub use assessment::lead_assessment_pipeline;
pub use builder::PipelineBuilder;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use spec::{ComponentDescriptor, PipelineSpec, StageSpec};
