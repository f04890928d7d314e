//! Test fixtures for engine and component tests.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::context::{ComponentContext, ComponentInputs, SubjectContext};
use crate::core::{ExecutionId, SubjectId};
use crate::pipeline::{ComponentDescriptor, JitterStrategy};

/// Builds a lead subject with a website field.
#[must_use]
pub fn lead_subject(subject_id: &str) -> SubjectContext {
    SubjectContext::new(SubjectId::new(subject_id))
        .with_field("website", serde_json::json!(format!("https://{subject_id}.example.com")))
        .with_field("name", serde_json::json!(subject_id))
}

/// Builds a component context with permissive, empty inputs.
#[must_use]
pub fn component_context(subject_id: &str) -> ComponentContext {
    ComponentContext::new(
        ExecutionId::new(),
        Arc::new(lead_subject(subject_id)),
        ComponentInputs::permissive(std::collections::HashMap::new(), "test"),
    )
}

/// A descriptor with millisecond timeouts and backoff, for fast tests.
#[must_use]
pub fn fast_descriptor(name: &str) -> ComponentDescriptor {
    ComponentDescriptor::new(name)
        .with_timeout(Duration::from_millis(200))
        .with_backoff_base(Duration::from_millis(1))
        .with_max_backoff(Duration::from_millis(5))
        .with_jitter(JitterStrategy::None)
}

/// Engine settings for tests: a generous pool and a short janitor period.
#[must_use]
pub fn fast_engine_config() -> EngineConfig {
    let mut config = EngineConfig::new().with_concurrency_limit(8);
    config.janitor_interval_seconds = 1;
    config
}
