//! Drives one execution through the pipeline.

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use super::EngineInner;
use crate::aggregator::FinishingRun;
use crate::cancellation::CancellationToken;
use crate::context::{ComponentContext, ComponentInputs, SubjectContext};
use crate::core::{ComponentResult, ExecutionRecord, SubjectId, TaskId, CANCELLED_MARKER};
use crate::errors::{CollaboratorError, ComponentError, OrchestratorError, Result};
use crate::events::{event_types, OrchestrationEvent};
use crate::observability::execution_span;
use crate::pipeline::{ComponentDescriptor, StageSpec};
use crate::utils::now_utc;

/// Why the stage loop stopped.
enum StageOutcome {
    Finished,
    Cancelled,
    Fatal(String),
}

/// A finished component plus any error from persisting its payload.
struct Dispatched {
    index: usize,
    result: ComponentResult,
    persist_error: Option<String>,
}

/// Single writer of one execution's record.
pub(crate) struct ExecutionDriver {
    inner: Arc<EngineInner>,
    record: ExecutionRecord,
    task_id: TaskId,
    subject: Arc<SubjectContext>,
    cancel: Arc<CancellationToken>,
}

impl ExecutionDriver {
    /// Collects expired executions, registers a new one and loads its
    /// subject context within the configured deadline.
    ///
    /// The inner result is [`OrchestratorError::FatalContext`] when the
    /// context could not be loaded; the execution is then already
    /// finalized as `failed` and published.
    pub(crate) async fn prepare(
        inner: &Arc<EngineInner>,
        subject_id: SubjectId,
    ) -> Result<(TaskId, Result<Self>)> {
        inner.store.gc();
        let mut record = ExecutionRecord::new(subject_id.clone());
        let execution_id = record.execution_id();
        let cancel = inner.store.register(record.clone());
        let task_id = inner
            .store
            .create(execution_id)
            .ok_or_else(|| OrchestratorError::Internal(format!("execution {execution_id} vanished")))?;

        info!(%execution_id, %task_id, subject_id = %subject_id, "Execution accepted");

        let deadline = inner.config.context_load_timeout();
        let loaded = tokio::time::timeout(deadline, inner.collaborators.load_subject_context(&subject_id))
            .await
            .unwrap_or_else(|_| {
                Err(CollaboratorError::Unavailable(format!(
                    "subject context load timed out after {deadline:?}"
                )))
            });

        match loaded {
            Ok(subject) => Ok((
                task_id,
                Ok(Self {
                    inner: Arc::clone(inner),
                    record,
                    task_id,
                    subject: Arc::new(subject),
                    cancel,
                }),
            )),
            Err(source) => {
                error!(%execution_id, subject_id = %subject_id, error = %source, "Failed to load subject context");
                if let Err(err) = inner
                    .aggregator
                    .finalize_aborted(&mut record, format!("subject context unavailable: {source}"))
                {
                    error!(%execution_id, error = %err, "Failed to finalize execution");
                }
                finish(inner, &record).await;
                Ok((task_id, Err(OrchestratorError::FatalContext { subject_id, source })))
            }
        }
    }

    /// Runs every stage, aggregates, persists and publishes the terminal
    /// record.
    pub(crate) async fn run(self) -> ExecutionRecord {
        let span = execution_span(
            self.record.execution_id(),
            self.record.subject_id(),
            &self.inner.spec.name,
        );
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> ExecutionRecord {
        if let Err(err) = self.record.mark_running() {
            error!(error = %err, "Execution could not start");
            return self.record;
        }
        self.inner.store.publish(self.record.clone());
        self.emit(event_types::EXECUTION_STARTED, json!({"task_id": self.task_id}));

        let inner = Arc::clone(&self.inner);
        let mut outcome = StageOutcome::Finished;
        for (index, stage) in inner.spec.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                outcome = StageOutcome::Cancelled;
                break;
            }

            let label = stage.label(index);
            debug!(stage = %label, components = stage.components.len(), "Dispatching stage");
            self.emit(event_types::STAGE_STARTED, json!({"stage": label}));

            let dispatched = self.run_stage(stage).await;
            let fatal = self.absorb(stage, dispatched);

            self.report_progress();
            self.emit(event_types::STAGE_COMPLETED, json!({"stage": label}));

            if self.cancel.is_cancelled() {
                outcome = StageOutcome::Cancelled;
                break;
            }
            if let Some(component) = fatal {
                outcome = StageOutcome::Fatal(component);
                break;
            }
        }

        self.conclude(outcome).await;
        self.record
    }

    /// Dispatches every component of a stage and waits for all of them.
    async fn run_stage(&self, stage: &StageSpec) -> Vec<Dispatched> {
        let mut finished = Vec::with_capacity(stage.components.len());
        let mut in_flight = FuturesUnordered::new();

        for (index, descriptor) in stage.components.iter().enumerate() {
            if let Some(dependency) = self.unmet_dependency(descriptor) {
                debug!(component = %descriptor.name, dependency = %dependency, "Skipping component");
                finished.push(Dispatched {
                    index,
                    result: ComponentResult::skipped(
                        &descriptor.name,
                        format!("dependency '{dependency}' did not succeed"),
                    ),
                    persist_error: None,
                });
                continue;
            }

            let ctx = ComponentContext::new(
                self.record.execution_id(),
                Arc::clone(&self.subject),
                self.inputs_for(descriptor),
            );
            let inner = Arc::clone(&self.inner);
            let cancel = Arc::clone(&self.cancel);
            let owned = descriptor.clone();
            let handle = tokio::spawn(
                async move {
                    let result = inner.runner.run(&owned, &ctx, &cancel).await;
                    let persist_error = persist_payload(&inner, ctx.subject_id(), &result).await;
                    (result, persist_error)
                }
                .in_current_span(),
            );

            let name = descriptor.name.clone();
            let started_at = now_utc();
            in_flight.push(async move {
                match handle.await {
                    Ok((result, persist_error)) => Dispatched {
                        index,
                        result,
                        persist_error,
                    },
                    Err(err) => {
                        error!(component = %name, error = %err, "Component task aborted");
                        Dispatched {
                            index,
                            result: ComponentResult::failed(
                                &name,
                                started_at,
                                1,
                                &ComponentError::permanent(format!("component task aborted: {err}")),
                            ),
                            persist_error: None,
                        }
                    }
                }
            });
        }

        while let Some(done) = in_flight.next().await {
            finished.push(done);
        }
        finished.sort_by_key(|d| d.index);
        finished
    }

    /// Records a stage's results. Returns the first failed fatal component.
    fn absorb(&mut self, stage: &StageSpec, dispatched: Vec<Dispatched>) -> Option<String> {
        let mut fatal = None;
        for Dispatched {
            index,
            result,
            persist_error,
        } in dispatched
        {
            if result.is_cancelled() {
                debug!(component = %result.component_name, "Discarding cancelled result");
                continue;
            }
            if let Some(err) = persist_error {
                self.push_error(format!("failed to persist '{}': {err}", result.component_name));
            }

            let event_type = if result.status.was_dispatched() {
                event_types::COMPONENT_COMPLETED
            } else {
                event_types::COMPONENT_SKIPPED
            };
            self.emit(
                event_type,
                json!({
                    "component": result.component_name,
                    "status": result.status,
                    "attempts": result.attempts,
                    "duration_ms": result.duration_ms,
                    "error": result.error_detail,
                }),
            );

            let is_fatal = stage.components.get(index).is_some_and(|d| d.fatal);
            if is_fatal && result.status.is_failure() && fatal.is_none() {
                warn!(component = %result.component_name, "Fatal component failed");
                self.push_error(format!(
                    "fatal component '{}' failed: {}",
                    result.component_name,
                    result.error_detail.as_deref().unwrap_or("unknown error")
                ));
                fatal = Some(result.component_name.clone());
            }

            if let Err(err) = self.record.record_result(result) {
                error!(error = %err, "Failed to record component result");
            }
        }
        fatal
    }

    /// Finalizes through the aggregator, persists and publishes.
    async fn conclude(&mut self, outcome: StageOutcome) {
        let inner = Arc::clone(&self.inner);
        let finalized = match outcome {
            StageOutcome::Finished => {
                let finishing = FinishingRun {
                    execution_id: self.record.execution_id(),
                    descriptors: &inner.spec.finishing,
                    runner: &inner.runner,
                    subject: Arc::clone(&self.subject),
                    cancel: &self.cancel,
                    collaborators: inner.collaborators.as_ref(),
                };
                inner.aggregator.finalize(&mut self.record, &finishing).await
            }
            StageOutcome::Cancelled => inner.aggregator.finalize_aborted(&mut self.record, CANCELLED_MARKER),
            StageOutcome::Fatal(component) => {
                debug!(component = %component, "Stopping after fatal failure");
                let reason = if self.cancel.close() {
                    "execution aborted"
                } else {
                    CANCELLED_MARKER
                };
                inner.aggregator.finalize_aborted(&mut self.record, reason)
            }
        };

        if let Err(err) = finalized {
            error!(error = %err, "Failed to finalize execution");
            if !self.record.is_terminal() {
                if let Err(err) = inner.aggregator.finalize_aborted(&mut self.record, err.to_string()) {
                    error!(error = %err, "Execution left non-terminal");
                }
            }
        }

        if self.record.was_cancelled() {
            self.emit(
                event_types::EXECUTION_CANCELLED,
                json!({"reason": self.cancel.reason()}),
            );
        }
        finish(&inner, &self.record).await;
    }

    fn unmet_dependency<'a>(&self, descriptor: &'a ComponentDescriptor) -> Option<&'a String> {
        descriptor.depends_on.iter().find(|dependency| {
            !self
                .record
                .result(dependency)
                .is_some_and(ComponentResult::is_success)
        })
    }

    fn inputs_for(&self, descriptor: &ComponentDescriptor) -> ComponentInputs {
        let payloads: HashMap<String, serde_json::Value> = descriptor
            .depends_on
            .iter()
            .filter_map(|dependency| {
                self.record
                    .result(dependency)
                    .and_then(|r| r.payload.clone())
                    .map(|payload| (dependency.clone(), payload))
            })
            .collect();
        ComponentInputs::strict(
            payloads,
            descriptor.depends_on.iter().cloned().collect(),
            &descriptor.name,
        )
    }

    fn report_progress(&self) {
        let total = self.inner.spec.total_component_count().max(1);
        let done = self.record.results().len().min(total);
        let percent = u8::try_from(done * 100 / total).unwrap_or(100);
        self.inner.store.update(self.task_id, percent);
        self.inner.store.publish(self.record.clone());
        self.emit(event_types::PROGRESS, json!({"progress_percent": percent}));
    }

    fn push_error(&mut self, message: String) {
        if let Err(err) = self.record.push_error(message) {
            error!(error = %err, "Failed to record error summary entry");
        }
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.inner.events.try_emit(
            OrchestrationEvent::new(
                event_type,
                self.record.execution_id(),
                self.record.subject_id().clone(),
            )
            .with_data(data),
        );
    }
}

/// Persists a successful payload. Failures are returned, never raised.
async fn persist_payload(
    inner: &EngineInner,
    subject_id: &SubjectId,
    result: &ComponentResult,
) -> Option<String> {
    let payload = result.payload.as_ref()?;
    match inner
        .collaborators
        .persist_component_result(subject_id, &result.component_name, payload)
        .await
    {
        Ok(()) => None,
        Err(err) => {
            warn!(component = %result.component_name, error = %err, "Failed to persist payload");
            Some(err.to_string())
        }
    }
}

/// Persists the terminal record, publishes it, trims the store to its
/// retained maximum and emits the final event.
async fn finish(inner: &EngineInner, record: &ExecutionRecord) {
    if let Err(err) = inner
        .collaborators
        .persist_final_status(record.subject_id(), record)
        .await
    {
        error!(
            execution_id = %record.execution_id(),
            error = %err,
            "Failed to persist final status"
        );
    }

    inner.store.publish(record.clone());
    inner.store.enforce_capacity();

    let summary = record.summary();
    info!(
        execution_id = %record.execution_id(),
        status = %record.status(),
        success_rate = summary.success_rate,
        succeeded = summary.succeeded,
        failed = summary.failed + summary.timed_out,
        skipped = summary.skipped,
        total_cost_units = summary.total_cost_units,
        "Execution finished"
    );
    inner.events.try_emit(
        OrchestrationEvent::new(
            event_types::EXECUTION_FINISHED,
            record.execution_id(),
            record.subject_id().clone(),
        )
        .with_data(json!({
            "status": record.status(),
            "summary": summary,
            "errors": record.error_summary(),
        })),
    );
}
