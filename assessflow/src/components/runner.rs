//! Bounded, retried, cancellable component execution.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::ComponentRegistry;
use crate::cancellation::CancellationToken;
use crate::collaborators::ExternalCollaborators;
use crate::context::ComponentContext;
use crate::core::{ComponentResult, SubjectId};
use crate::errors::ComponentError;
use crate::pipeline::ComponentDescriptor;
use crate::utils::now_utc;

/// Executes one component with its timeout and retry policy.
///
/// [`ComponentRunner::run`] never fails: every outcome, including a
/// missing implementation, is captured in the returned [`ComponentResult`].
#[derive(Clone)]
pub struct ComponentRunner {
    registry: Arc<ComponentRegistry>,
    collaborators: Arc<dyn ExternalCollaborators>,
    slots: Arc<Semaphore>,
}

impl ComponentRunner {
    /// Creates a runner sharing the engine's worker pool.
    #[must_use]
    pub fn new(
        registry: Arc<ComponentRegistry>,
        collaborators: Arc<dyn ExternalCollaborators>,
        slots: Arc<Semaphore>,
    ) -> Self {
        Self {
            registry,
            collaborators,
            slots,
        }
    }

    /// Returns the number of free worker slots.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Runs a component to a terminal result.
    ///
    /// Holds one worker slot for the whole run, retries included. Every
    /// wait is raced against `cancel`; a cancelled run returns a result
    /// with [`ComponentErrorKind::Cancelled`](crate::errors::ComponentErrorKind::Cancelled).
    #[instrument(
        name = "component",
        skip_all,
        fields(component = %descriptor.name, execution_id = %ctx.execution_id())
    )]
    pub async fn run(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &ComponentContext,
        cancel: &CancellationToken,
    ) -> ComponentResult {
        let name = descriptor.name.as_str();
        let started_at = now_utc();

        let Some(component) = self.registry.get(name) else {
            warn!("No component registered");
            return ComponentResult::failed(
                name,
                started_at,
                0,
                &ComponentError::permanent(format!("no component registered under '{name}'")),
            );
        };

        let _slot = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return ComponentResult::failed(name, started_at, 0, &ComponentError::cancelled());
            }
            slot = Arc::clone(&self.slots).acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => {
                    return ComponentResult::failed(
                        name,
                        started_at,
                        0,
                        &ComponentError::permanent("worker pool closed"),
                    );
                }
            },
        };

        let policy = descriptor.retry_policy();
        let timeout = descriptor.timeout();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let attempt_ctx = ctx.for_attempt(attempts);

            // Dropping the invoke future abandons the attempt.
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ComponentError::cancelled()),
                res = tokio::time::timeout(timeout, component.invoke(&attempt_ctx)) => {
                    res.unwrap_or_else(|_| Err(ComponentError::timeout(timeout)))
                }
            };

            let err = match outcome {
                Ok(output) => {
                    debug!(attempt = attempts, "Component succeeded");
                    let result = ComponentResult::success(name, started_at, attempts, output);
                    self.record_cost(ctx.subject_id(), &result).await;
                    return result;
                }
                Err(err) => err,
            };

            if cancel.is_cancelled() {
                debug!(attempt = attempts, "Component abandoned on cancellation");
                return ComponentResult::failed(name, started_at, attempts, &ComponentError::cancelled());
            }

            if !err.is_retryable() || !policy.allows_retry(attempts) {
                warn!(
                    attempt = attempts,
                    error_kind = %err.kind,
                    error = %err.message,
                    "Component failed"
                );
                return ComponentResult::failed(name, started_at, attempts, &err);
            }

            let delay = policy.delay_for(attempts - 1);
            debug!(
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err.message,
                "Retrying after error"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return ComponentResult::failed(name, started_at, attempts, &ComponentError::cancelled());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn record_cost(&self, subject_id: &SubjectId, result: &ComponentResult) {
        if result.cost_units <= 0.0 {
            return;
        }
        if let Err(err) = self
            .collaborators
            .record_cost(subject_id, &result.component_name, result.cost_units)
            .await
        {
            warn!(error = %err, cost_units = result.cost_units, "Failed to record cost");
        }
    }
}

impl std::fmt::Debug for ComponentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRunner")
            .field("components", &self.registry.names())
            .field("available_slots", &self.available_slots())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryCollaborators, MockExternalCollaborators};
    use crate::context::{ComponentInputs, SubjectContext};
    use crate::core::{ComponentStatus, ExecutionId};
    use crate::errors::{CollaboratorError, ComponentErrorKind};
    use crate::testing::{FailingComponent, ScriptedComponent, SlowComponent, SucceedingComponent};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn ctx() -> ComponentContext {
        let subject = SubjectContext::new(SubjectId::from("lead-1"));
        ComponentContext::new(ExecutionId::new(), Arc::new(subject), ComponentInputs::default())
    }

    fn runner_with(component: Arc<dyn crate::components::Component>) -> ComponentRunner {
        let registry = ComponentRegistry::new().with_component(component);
        ComponentRunner::new(
            Arc::new(registry),
            Arc::new(InMemoryCollaborators::new()),
            Arc::new(Semaphore::new(4)),
        )
    }

    fn fast(name: &str) -> ComponentDescriptor {
        ComponentDescriptor::new(name)
            .with_timeout(Duration::from_millis(200))
            .with_backoff_base(Duration::from_millis(1))
            .with_max_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let component = Arc::new(SucceedingComponent::new("pagespeed", json!({"score": 90})));
        let runner = runner_with(component.clone());

        let result = runner.run(&fast("pagespeed"), &ctx(), &CancellationToken::new()).await;

        assert_eq!(result.status, ComponentStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.payload, Some(json!({"score": 90})));
        assert_eq!(component.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let component = Arc::new(
            ScriptedComponent::new("security_scan")
                .then_fail(ComponentError::transient("HTTP 503"))
                .then_fail(ComponentError::transient("HTTP 503"))
                .then_succeed(json!({"grade": "A"})),
        );
        let runner = runner_with(component.clone());

        let result = runner
            .run(&fast("security_scan").with_max_retries(2), &ctx(), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(component.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let component = Arc::new(FailingComponent::transient("semrush_seo", "rate limited"));
        let runner = runner_with(component.clone());

        let result = runner
            .run(&fast("semrush_seo").with_max_retries(2), &ctx(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, ComponentStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(component.call_count(), 3);
        assert_eq!(result.error_detail.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let component = Arc::new(FailingComponent::permanent("screenshot_capture", "invalid url"));
        let runner = runner_with(component.clone());

        let result = runner
            .run(&fast("screenshot_capture").with_max_retries(5), &ctx(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, ComponentStatus::Failed);
        assert_eq!(result.error_kind, Some(ComponentErrorKind::Permanent));
        assert_eq!(component.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_on_final_attempt() {
        let component = Arc::new(SlowComponent::new("visual_analysis", Duration::from_secs(5)));
        let runner = runner_with(component.clone());
        let descriptor = fast("visual_analysis")
            .with_timeout(Duration::from_millis(30))
            .with_max_retries(1);

        let started = Instant::now();
        let result = runner.run(&descriptor, &ctx(), &CancellationToken::new()).await;

        assert_eq!(result.status, ComponentStatus::TimedOut);
        assert_eq!(result.attempts, 2);
        assert_eq!(component.started_count(), 2);
        assert_eq!(component.finished_count(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_component_is_permanent_failure() {
        let runner = runner_with(Arc::new(SucceedingComponent::new("a", json!(null))));
        let result = runner.run(&fast("ghost"), &ctx(), &CancellationToken::new()).await;

        assert_eq!(result.status, ComponentStatus::Failed);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.error_kind, Some(ComponentErrorKind::Permanent));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_attempt() {
        let component = Arc::new(SlowComponent::new("slow", Duration::from_secs(5)));
        let runner = runner_with(component);
        let cancel = Arc::new(CancellationToken::new());

        let handle = {
            let cancel = Arc::clone(&cancel);
            let runner = runner.clone();
            tokio::spawn(async move {
                runner
                    .run(&fast("slow").with_timeout(Duration::from_secs(10)), &ctx(), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel("user");

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_cancelled());
        assert_eq!(runner.available_slots(), 4);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let component = Arc::new(FailingComponent::transient("flaky", "503"));
        let runner = runner_with(component.clone());
        let cancel = Arc::new(CancellationToken::new());
        let descriptor = fast("flaky")
            .with_max_retries(3)
            .with_backoff_base(Duration::from_secs(10))
            .with_max_backoff(Duration::from_secs(10));

        let handle = {
            let cancel = Arc::clone(&cancel);
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(&descriptor, &ctx(), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel("user");

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_cancelled());
        assert_eq!(component.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cost_recorded_through_collaborators() {
        let mut collaborators = MockExternalCollaborators::new();
        collaborators
            .expect_record_cost()
            .withf(|subject, component, units| {
                subject.as_str() == "lead-1" && component == "content_generation" && (*units - 2.5).abs() < f64::EPSILON
            })
            .times(1)
            .returning(|_, _, _| Err(CollaboratorError::Unavailable("ledger down".to_string())));

        let component = Arc::new(SucceedingComponent::new("content_generation", json!({})).with_cost(2.5));
        let runner = ComponentRunner::new(
            Arc::new(ComponentRegistry::new().with_component(component)),
            Arc::new(collaborators),
            Arc::new(Semaphore::new(1)),
        );

        let result = runner.run(&fast("content_generation"), &ctx(), &CancellationToken::new()).await;

        // ledger failures never fail the component
        assert!(result.is_success());
        assert!((result.cost_units - 2.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_worker_slots_bound_concurrency() {
        let component = Arc::new(SlowComponent::new("slow", Duration::from_millis(50)));
        let registry = ComponentRegistry::new().with_component(component.clone());
        let runner = ComponentRunner::new(
            Arc::new(registry),
            Arc::new(InMemoryCollaborators::new()),
            Arc::new(Semaphore::new(2)),
        );

        let cancel = Arc::new(CancellationToken::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let runner = runner.clone();
                let cancel = Arc::clone(&cancel);
                tokio::spawn(async move { runner.run(&fast("slow"), &ctx(), &cancel).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert!(component.max_in_flight() <= 2);
    }
}
