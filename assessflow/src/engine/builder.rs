//! Validating builder for [`OrchestrationEngine`].

use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{EngineInner, OrchestrationEngine};
use crate::aggregator::ResultAggregator;
use crate::collaborators::ExternalCollaborators;
use crate::components::{Component, ComponentRegistry, ComponentRunner};
use crate::config::{EngineConfig, OrchestratorConfig};
use crate::errors::{ConfigError, ContractErrorInfo, PipelineValidationError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::PipelineSpec;
use crate::status::StatusStore;

/// Builder for an [`OrchestrationEngine`].
///
/// `build` validates the configuration, the pipeline and that every
/// component it names has a registered implementation.
pub struct EngineBuilder {
    spec: PipelineSpec,
    registry: ComponentRegistry,
    collaborators: Option<Arc<dyn ExternalCollaborators>>,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    store: Option<Arc<StatusStore>>,
}

impl EngineBuilder {
    /// Creates a builder for a pipeline with default settings.
    #[must_use]
    pub fn new(spec: PipelineSpec) -> Self {
        Self {
            spec,
            registry: ComponentRegistry::new(),
            collaborators: None,
            config: EngineConfig::default(),
            events: Arc::new(NoOpEventSink),
            store: None,
        }
    }

    /// Creates a builder from a loaded configuration.
    #[must_use]
    pub fn from_config(config: OrchestratorConfig) -> Self {
        Self::new(config.pipeline).with_config(config.engine)
    }

    /// Registers a component implementation.
    #[must_use]
    pub fn component(mut self, component: Arc<dyn Component>) -> Self {
        self.registry.register(component);
        self
    }

    /// Replaces the component registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the persistence collaborators. Required.
    #[must_use]
    pub fn with_collaborators(mut self, collaborators: Arc<dyn ExternalCollaborators>) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shares an existing status store instead of creating one.
    #[must_use]
    pub fn with_status_store(mut self, store: Arc<StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates everything and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid engine settings or missing
    /// collaborators, and a validation error for an invalid pipeline or
    /// unregistered components.
    pub fn build(self) -> Result<OrchestrationEngine> {
        self.config.validate()?;
        self.spec.validate()?;

        let missing = self.registry.missing_for(&self.spec);
        if !missing.is_empty() {
            let info = ContractErrorInfo::new(
                "CONTRACT-004-UNREGISTERED",
                "Pipeline references components with no implementation",
            )
            .with_fix_hint("Register an implementation for every component in the pipeline")
            .with_context_entry("missing", missing.join(", "));
            return Err(PipelineValidationError::new(format!(
                "No component registered for: {}",
                missing.join(", ")
            ))
            .with_components(missing)
            .with_error_info(info)
            .into());
        }

        let collaborators = self
            .collaborators
            .ok_or_else(|| ConfigError::invalid("collaborators", "must be provided"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(StatusStore::from_config(&self.config)));
        let slots = Arc::new(Semaphore::new(self.config.global_concurrency_limit));
        let runner = ComponentRunner::new(Arc::new(self.registry), Arc::clone(&collaborators), slots);

        Ok(OrchestrationEngine::from_inner(EngineInner {
            spec: Arc::new(self.spec),
            runner,
            collaborators,
            store,
            events: self.events,
            aggregator: ResultAggregator::new(self.config.partial_success_threshold),
            config: self.config,
        }))
    }
}
