//! Result aggregation and finishing components.
//!
//! The aggregator turns the component results of an execution into its
//! single terminal status. It is invoked exactly once per execution, either
//! through [`ResultAggregator::finalize`] after the last stage barrier or
//! through [`ResultAggregator::finalize_aborted`] when the run stops early.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::collaborators::ExternalCollaborators;
use crate::components::ComponentRunner;
use crate::context::{ComponentContext, ComponentInputs, SubjectContext};
use crate::core::{ComponentResult, ExecutionId, ExecutionRecord, ExecutionStatus, CANCELLED_MARKER};
use crate::errors::Result;
use crate::pipeline::ComponentDescriptor;

/// Computes terminal statuses from component results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultAggregator {
    partial_success_threshold: f64,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ResultAggregator {
    /// Creates an aggregator; the threshold is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(partial_success_threshold: f64) -> Self {
        Self {
            partial_success_threshold: partial_success_threshold.clamp(0.0, 1.0),
        }
    }

    /// Returns the partial success threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.partial_success_threshold
    }

    /// `successful / (total - skipped)`, or 0.0 when nothing was dispatched.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(results: &[ComponentResult]) -> f64 {
        let dispatched = results.iter().filter(|r| r.status.was_dispatched()).count();
        if dispatched == 0 {
            return 0.0;
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        (succeeded as f64 / dispatched as f64).clamp(0.0, 1.0)
    }

    /// Maps a result set to `(status, success_rate)`.
    ///
    /// A rate of 1.0 is `completed`, at least the threshold is
    /// `partially_completed`, anything lower is `failed`.
    #[must_use]
    pub fn aggregate(&self, results: &[ComponentResult]) -> (ExecutionStatus, f64) {
        let rate = Self::success_rate(results);
        let dispatched = results.iter().any(|r| r.status.was_dispatched());
        let status = if !dispatched {
            ExecutionStatus::Failed
        } else if rate >= 1.0 {
            ExecutionStatus::Completed
        } else if rate >= self.partial_success_threshold {
            ExecutionStatus::PartiallyCompleted
        } else {
            ExecutionStatus::Failed
        };
        (status, rate)
    }

    /// Computes the terminal status, runs the finishing components and
    /// finalizes the record.
    ///
    /// Finishing components run whenever at least one component was
    /// dispatched, whatever the aggregated status, and read whatever
    /// payloads are available. Finishing results are recorded and their payloads persisted, but they
    /// do not change the status or the success rate. A finishing failure
    /// adds an error summary entry. The cancellation token is closed right
    /// before the status is committed; a cancellation that wins that race
    /// turns the execution into a cancelled `failed` one.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not running.
    pub async fn finalize(
        &self,
        record: &mut ExecutionRecord,
        finishing: &FinishingRun<'_>,
    ) -> Result<(ExecutionStatus, f64)> {
        let (status, rate) = self.aggregate(record.results());
        debug!(%status, success_rate = rate, "Aggregated component results");

        let dispatched = record.results().iter().any(|r| r.status.was_dispatched());
        if dispatched && !finishing.descriptors.is_empty() {
            let results = finishing.run(record.results()).await;
            if finishing.cancel.is_cancelled() {
                return self.finalize_aborted(record, CANCELLED_MARKER);
            }
            let subject_id = record.subject_id().clone();
            for result in results {
                if let Some(payload) = &result.payload {
                    if let Err(err) = finishing
                        .collaborators
                        .persist_component_result(&subject_id, &result.component_name, payload)
                        .await
                    {
                        warn!(component = %result.component_name, error = %err, "Failed to persist payload");
                        record.push_error(format!(
                            "failed to persist '{}': {err}",
                            result.component_name
                        ))?;
                    }
                }
                if result.status.is_failure() {
                    record.push_error(format!(
                        "finishing component '{}' failed: {}",
                        result.component_name,
                        result.error_detail.as_deref().unwrap_or("unknown error")
                    ))?;
                }
                record.record_result(result)?;
            }
        }

        if !finishing.cancel.close() {
            return self.finalize_aborted(record, CANCELLED_MARKER);
        }
        record.finalize(status, rate)?;
        info!(%status, success_rate = rate, "Execution finalized");
        Ok((status, rate))
    }

    /// Finalizes an execution that stopped early as `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal.
    pub fn finalize_aborted(
        &self,
        record: &mut ExecutionRecord,
        reason: impl Into<String>,
    ) -> Result<(ExecutionStatus, f64)> {
        let rate = Self::success_rate(record.results());
        let reason = reason.into();
        warn!(reason = %reason, success_rate = rate, "Execution aborted");
        record.push_error(reason)?;
        record.finalize(ExecutionStatus::Failed, rate)?;
        Ok((ExecutionStatus::Failed, rate))
    }
}

/// Everything needed to dispatch the finishing components.
pub struct FinishingRun<'a> {
    /// The execution the finishing components belong to.
    pub execution_id: ExecutionId,
    /// The finishing descriptors.
    pub descriptors: &'a [ComponentDescriptor],
    /// The runner shared with the stages.
    pub runner: &'a ComponentRunner,
    /// The subject context.
    pub subject: Arc<SubjectContext>,
    /// The execution's cancellation token.
    pub cancel: &'a CancellationToken,
    /// Where successful finishing payloads are persisted.
    pub collaborators: &'a dyn ExternalCollaborators,
}

impl FinishingRun<'_> {
    /// Runs every finishing component concurrently with access to every
    /// successful payload. Declared dependencies do not gate finishing
    /// components; they read whatever results are available.
    async fn run(&self, results: &[ComponentResult]) -> Vec<ComponentResult> {
        let payloads: HashMap<String, serde_json::Value> = results
            .iter()
            .filter_map(|r| r.payload.clone().map(|p| (r.component_name.clone(), p)))
            .collect();

        let futures = self.descriptors.iter().map(|descriptor| {
            let ctx = ComponentContext::new(
                self.execution_id,
                Arc::clone(&self.subject),
                ComponentInputs::permissive(payloads.clone(), &descriptor.name),
            );
            async move { self.runner.run(descriptor, &ctx, self.cancel).await }
        });

        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCollaborators;
    use crate::components::ComponentRegistry;
    use crate::core::{ComponentOutput, ComponentStatus, SubjectId};
    use crate::errors::ComponentError;
    use crate::testing::{fast_descriptor, lead_subject, FailingComponent, SucceedingComponent};
    use crate::utils::now_utc;
    use serde_json::json;
    use tokio::sync::Semaphore;

    fn ok(name: &str) -> ComponentResult {
        ComponentResult::success(name, now_utc(), 1, ComponentOutput::new(json!({"name": name})))
    }

    fn failed(name: &str) -> ComponentResult {
        ComponentResult::failed(name, now_utc(), 1, &ComponentError::permanent("boom"))
    }

    fn running_record(results: Vec<ComponentResult>) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        record.mark_running().unwrap();
        for result in results {
            record.record_result(result).unwrap();
        }
        record
    }

    fn runner(registry: ComponentRegistry) -> ComponentRunner {
        ComponentRunner::new(
            Arc::new(registry),
            Arc::new(InMemoryCollaborators::new()),
            Arc::new(Semaphore::new(4)),
        )
    }

    #[test]
    fn test_success_rate_excludes_skipped() {
        let results = vec![ok("a"), failed("b"), ComponentResult::skipped("c", "upstream failed")];
        assert!((ResultAggregator::success_rate(&results) - 0.5).abs() < f64::EPSILON);
        assert!(ResultAggregator::success_rate(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_thresholds() {
        let aggregator = ResultAggregator::default();

        assert_eq!(aggregator.aggregate(&[ok("a"), ok("b")]).0, ExecutionStatus::Completed);
        assert_eq!(
            aggregator.aggregate(&[ok("a"), failed("b")]).0,
            ExecutionStatus::PartiallyCompleted
        );
        assert_eq!(
            aggregator.aggregate(&[ok("a"), failed("b"), failed("c")]).0,
            ExecutionStatus::Failed
        );
        assert_eq!(aggregator.aggregate(&[]).0, ExecutionStatus::Failed);
    }

    #[test]
    fn test_all_skipped_is_failed() {
        let aggregator = ResultAggregator::new(0.0);
        let (status, rate) = aggregator.aggregate(&[ComponentResult::skipped("a", "x")]);
        assert_eq!(status, ExecutionStatus::Failed);
        assert!(rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert!((ResultAggregator::new(3.0).threshold() - 1.0).abs() < f64::EPSILON);
        assert!(ResultAggregator::new(-1.0).threshold().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_finalize_runs_finishing_with_all_payloads() {
        let registry = ComponentRegistry::new()
            .with_component(Arc::new(SucceedingComponent::new("business_scoring", json!({"score": 80}))));
        let runner = runner(registry);
        let cancel = CancellationToken::new();
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ok("pagespeed"), failed("security_scan")]);
        let execution_id = record.execution_id();
        let finishing = [fast_descriptor("business_scoring")];

        let (status, rate) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &finishing,
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::PartiallyCompleted);
        assert!((rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(record.status(), ExecutionStatus::PartiallyCompleted);
        assert_eq!(
            record.result("business_scoring").map(|r| r.status),
            Some(ComponentStatus::Success)
        );
        assert_eq!(
            collaborators.payload(record.subject_id(), "business_scoring"),
            Some(json!({"score": 80}))
        );
    }

    #[tokio::test]
    async fn test_finalize_runs_finishing_when_execution_fails() {
        let scoring = Arc::new(SucceedingComponent::new("business_scoring", json!({"score": 10})));
        let runner = runner(ComponentRegistry::new().with_component(scoring.clone()));
        let cancel = CancellationToken::new();
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ok("pagespeed"), failed("security_scan"), failed("semrush")]);
        let execution_id = record.execution_id();
        let finishing = [fast_descriptor("business_scoring")];

        let (status, rate) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &finishing,
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Failed);
        assert!((rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(scoring.call_count(), 1);
        assert_eq!(
            record.result("business_scoring").map(|r| r.status),
            Some(ComponentStatus::Success)
        );
        assert_eq!(
            collaborators.payload(record.subject_id(), "business_scoring"),
            Some(json!({"score": 10}))
        );
    }

    #[tokio::test]
    async fn test_finalize_skips_finishing_when_nothing_dispatched() {
        let scoring = Arc::new(SucceedingComponent::new("business_scoring", json!({})));
        let runner = runner(ComponentRegistry::new().with_component(scoring.clone()));
        let cancel = CancellationToken::new();
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ComponentResult::skipped("vision", "upstream failed")]);
        let execution_id = record.execution_id();
        let finishing = [fast_descriptor("business_scoring")];

        let (status, _) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &finishing,
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Failed);
        assert_eq!(scoring.call_count(), 0);
        assert!(record.result("business_scoring").is_none());
    }

    #[tokio::test]
    async fn test_finishing_failure_keeps_status_and_adds_error() {
        let runner = runner(
            ComponentRegistry::new()
                .with_component(Arc::new(FailingComponent::permanent("content_generation", "quota"))),
        );
        let cancel = CancellationToken::new();
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ok("pagespeed")]);
        let execution_id = record.execution_id();
        let finishing = [fast_descriptor("content_generation")];

        let (status, rate) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &finishing,
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Completed);
        assert!((rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.error_summary().len(), 1);
        assert!(record.error_summary()[0].contains("content_generation"));
    }

    #[tokio::test]
    async fn test_finalize_closes_cancellation() {
        let runner = runner(ComponentRegistry::new());
        let cancel = CancellationToken::new();
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ok("pagespeed")]);
        let execution_id = record.execution_id();

        let (status, _) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &[],
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Completed);
        assert!(cancel.is_closed());
        assert!(!cancel.cancel("too late"));
        assert!(!record.was_cancelled());
    }

    #[tokio::test]
    async fn test_finalize_honours_pending_cancellation() {
        let runner = runner(ComponentRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel("cancel requested");
        let collaborators = InMemoryCollaborators::new();
        let mut record = running_record(vec![ok("pagespeed")]);
        let execution_id = record.execution_id();

        let (status, _) = ResultAggregator::default()
            .finalize(
                &mut record,
                &FinishingRun {
                    execution_id,
                    descriptors: &[],
                    runner: &runner,
                    subject: Arc::new(lead_subject("lead-1")),
                    cancel: &cancel,
                    collaborators: &collaborators,
                },
            )
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Failed);
        assert!(record.was_cancelled());
    }

    #[test]
    fn test_finalize_aborted() {
        let mut record = running_record(vec![ok("pagespeed"), failed("security_scan")]);
        let (status, rate) = ResultAggregator::default()
            .finalize_aborted(&mut record, CANCELLED_MARKER)
            .unwrap();

        assert_eq!(status, ExecutionStatus::Failed);
        assert!((rate - 0.5).abs() < f64::EPSILON);
        assert!(record.was_cancelled());
        assert!(record.is_terminal());
    }

    #[test]
    fn test_finalize_aborted_from_pending() {
        let mut record = ExecutionRecord::new(SubjectId::from("lead-1"));
        ResultAggregator::default()
            .finalize_aborted(&mut record, "subject context unavailable")
            .unwrap();
        assert_eq!(record.status(), ExecutionStatus::Failed);
        assert!(record.results().is_empty());
    }
}
