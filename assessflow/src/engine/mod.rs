//! The orchestration engine.
//!
//! [`OrchestrationEngine`] accepts subjects, drives each execution through
//! the pipeline's stages on its own tokio task and exposes live status for
//! polling and streaming clients.
//!
//! Each execution:
//! 1. Loads the subject context (failure is terminal, nothing dispatched)
//! 2. Runs every stage with a strict barrier between stages
//! 3. Skips components whose dependencies did not succeed
//! 4. Hands the results to the [`ResultAggregator`] exactly once

mod builder;
mod driver;


pub use builder::EngineBuilder;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::aggregator::ResultAggregator;
use crate::collaborators::ExternalCollaborators;
use crate::components::ComponentRunner;
use crate::config::EngineConfig;
use crate::core::{ExecutionId, ExecutionRecord, SubjectId, TaskId};
use crate::errors::{OrchestratorError, Result};
use crate::events::EventSink;
use crate::pipeline::PipelineSpec;
use crate::status::{ProgressUpdate, StatusSnapshot, StatusStore};
use driver::ExecutionDriver;

/// Shared state of an engine, owned jointly by the engine handle and every
/// running execution.
pub(crate) struct EngineInner {
    pub(crate) spec: Arc<PipelineSpec>,
    pub(crate) runner: ComponentRunner,
    pub(crate) collaborators: Arc<dyn ExternalCollaborators>,
    pub(crate) store: Arc<StatusStore>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) aggregator: ResultAggregator,
    pub(crate) config: EngineConfig,
}

/// Runs assessment pipelines for subjects.
///
/// Cheap to clone; clones share the worker pool and the status store.
///
/// ```no_run
/// use std::sync::Arc;
/// use assessflow::prelude::*;
///
/// # async fn example(registry: ComponentRegistry) -> assessflow::errors::Result<()> {
/// let engine = OrchestrationEngine::builder(lead_assessment_pipeline()?)
///     .with_registry(registry)
///     .with_collaborators(Arc::new(InMemoryCollaborators::new()))
///     .build()?;
///
/// let task_id = engine.submit("lead-42").await?;
/// let record = engine.wait(task_id).await?;
/// println!("{} at {:.0}%", record.status(), record.success_rate() * 100.0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OrchestrationEngine {
    inner: Arc<EngineInner>,
}

impl OrchestrationEngine {
    /// Starts building an engine for a pipeline.
    #[must_use]
    pub fn builder(spec: PipelineSpec) -> EngineBuilder {
        EngineBuilder::new(spec)
    }

    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Accepts a subject and starts its execution in the background.
    ///
    /// The subject context is loaded before this returns. If loading fails
    /// the returned task is already terminal with status `failed` and no
    /// component was dispatched.
    ///
    /// # Errors
    ///
    /// Only internal bookkeeping failures are returned; component and
    /// collaborator failures are reported through the task's status.
    pub async fn submit(&self, subject_id: impl Into<SubjectId>) -> Result<TaskId> {
        let (task_id, driver) = ExecutionDriver::prepare(&self.inner, subject_id.into()).await?;
        if let Ok(driver) = driver {
            debug!(%task_id, "Spawning execution");
            tokio::spawn(driver.run());
        }
        Ok(task_id)
    }

    /// Runs an execution to completion on the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::FatalContext`] if the subject context
    /// cannot be loaded. The failed record is still published to the store.
    pub async fn execute(&self, subject_id: impl Into<SubjectId>) -> Result<ExecutionRecord> {
        let (_, driver) = ExecutionDriver::prepare(&self.inner, subject_id.into()).await?;
        Ok(driver?.run().await)
    }

    /// Returns the current record snapshot behind a task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for unknown or collected
    /// tasks.
    pub fn status(&self, task_id: TaskId) -> Result<Arc<ExecutionRecord>> {
        self.inner
            .store
            .record(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    /// Returns the polling snapshot for a task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for unknown or collected
    /// tasks.
    pub fn get_status(&self, task_id: TaskId) -> Result<StatusSnapshot> {
        self.inner
            .store
            .get(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    /// Requests cancellation of the execution behind a task.
    ///
    /// Returns false if the task is unknown, already terminal or already
    /// cancelled, and also once the execution has started committing its
    /// terminal status. A true return means the record will end `failed`
    /// with a cancellation entry.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let cancelled = self.inner.store.cancel(task_id, "cancel requested");
        if cancelled {
            info!(%task_id, "Cancellation requested");
        }
        cancelled
    }

    /// Waits until the execution behind a task is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] if the task is unknown
    /// or is collected while waiting.
    pub async fn wait(&self, task_id: TaskId) -> Result<Arc<ExecutionRecord>> {
        let mut updates = self.subscribe(task_id)?;
        updates
            .wait_for(ProgressUpdate::is_terminal)
            .await
            .map_err(|_| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        self.status(task_id)
    }

    /// Subscribes to progress updates for a task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for unknown tasks.
    pub fn subscribe(&self, task_id: TaskId) -> Result<watch::Receiver<ProgressUpdate>> {
        self.inner
            .store
            .subscribe(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    /// Creates an additional task handle for an existing execution.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ExecutionNotFound`] if the execution is
    /// unknown or was collected.
    pub fn track(&self, execution_id: ExecutionId) -> Result<TaskId> {
        self.inner
            .store
            .create(execution_id)
            .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Collects expired executions. Returns how many were removed.
    pub fn gc(&self) -> usize {
        self.inner.store.gc()
    }

    /// Spawns the periodic status janitor using the configured interval.
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        self.inner.store.spawn_janitor(self.inner.config.janitor_interval())
    }

    /// Returns the pipeline definition.
    #[must_use]
    pub fn spec(&self) -> &PipelineSpec {
        &self.inner.spec
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the status store.
    #[must_use]
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.inner.store
    }

    /// Returns the number of free worker slots.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.inner.runner.available_slots()
    }
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("pipeline", &self.inner.spec.name)
            .field("runner", &self.inner.runner)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}
