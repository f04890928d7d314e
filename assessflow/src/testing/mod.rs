//! Testing utilities for assessment pipelines.
//!
//! This module provides:
//! - Mock components with scripted outcomes and concurrency tracking
//! - Subject and context fixtures
//! - Assertions over execution records

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_component_skipped, assert_component_status, assert_component_succeeded,
    assert_execution_status, assert_not_invoked, assert_success_rate,
};
pub use fixtures::{component_context, fast_descriptor, fast_engine_config, lead_subject};
pub use mocks::{
    FailingComponent, Invocation, InvocationLog, RecordingComponent, ScriptedComponent,
    SlowComponent, SucceedingComponent,
};
