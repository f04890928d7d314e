//! Mock components for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::components::Component;
use crate::context::ComponentContext;
use crate::core::ComponentOutput;
use crate::errors::ComponentError;

/// A component that always succeeds with a fixed payload.
#[derive(Debug)]
pub struct SucceedingComponent {
    name: String,
    payload: serde_json::Value,
    cost_units: f64,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl SucceedingComponent {
    /// Creates a new succeeding component.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            cost_units: 0.0,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Reports a cost with every success.
    #[must_use]
    pub fn with_cost(mut self, cost_units: f64) -> Self {
        self.cost_units = cost_units;
        self
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for SucceedingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ComponentOutput::new(self.payload.clone()).with_cost(self.cost_units))
    }
}

/// A component that always fails.
#[derive(Debug)]
pub struct FailingComponent {
    name: String,
    error: ComponentError,
    calls: AtomicUsize,
}

impl FailingComponent {
    /// Creates a component failing with a retryable error.
    #[must_use]
    pub fn transient(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_error(name, ComponentError::transient(message))
    }

    /// Creates a component failing with a non-retryable error.
    #[must_use]
    pub fn permanent(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_error(name, ComponentError::permanent(message))
    }

    /// Creates a component failing with the given error.
    #[must_use]
    pub fn with_error(name: impl Into<String>, error: ComponentError) -> Self {
        Self {
            name: name.into(),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for FailingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A component that takes time to answer.
///
/// Tracks how many attempts started, how many ran to completion, and the
/// peak number running at once.
#[derive(Debug)]
pub struct SlowComponent {
    name: String,
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SlowComponent {
    /// Creates a new slow component.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns the number of attempts started.
    #[must_use]
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the number of attempts that ran to completion.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Returns the peak concurrency observed.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for SlowComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        tokio::time::sleep(self.delay).await;

        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ComponentOutput::new(serde_json::json!({ "component": self.name })))
    }
}

#[derive(Debug, Clone)]
enum Step {
    Succeed(serde_json::Value),
    Fail(ComponentError),
    Sleep(Duration, serde_json::Value),
}

/// A component that plays back a script of outcomes, one per attempt.
///
/// Once the script is exhausted the last step repeats.
#[derive(Debug)]
pub struct ScriptedComponent {
    name: String,
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    observed_inputs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedComponent {
    /// Creates a component with an empty script (succeeds with `null`).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            observed_inputs: Mutex::new(Vec::new()),
        }
    }

    /// Appends a successful attempt.
    #[must_use]
    pub fn then_succeed(self, payload: serde_json::Value) -> Self {
        self.script.lock().push_back(Step::Succeed(payload));
        self
    }

    /// Appends a failed attempt.
    #[must_use]
    pub fn then_fail(self, error: ComponentError) -> Self {
        self.script.lock().push_back(Step::Fail(error));
        self
    }

    /// Appends an attempt that sleeps before succeeding.
    #[must_use]
    pub fn then_sleep(self, delay: Duration, payload: serde_json::Value) -> Self {
        self.script.lock().push_back(Step::Sleep(delay, payload));
        self
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns, per invocation, the components whose payloads were visible.
    #[must_use]
    pub fn observed_inputs(&self) -> Vec<Vec<String>> {
        self.observed_inputs.lock().clone()
    }

    fn next_step(&self) -> Step {
        let step = self.script.lock().pop_front();
        let mut last = self.last.lock();
        match step {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Succeed(serde_json::Value::Null)),
        }
    }
}

#[async_trait]
impl Component for ScriptedComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.observed_inputs.lock().push(
            ctx.inputs()
                .components()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );

        match self.next_step() {
            Step::Succeed(payload) => Ok(ComponentOutput::new(payload)),
            Step::Fail(error) => Err(error),
            Step::Sleep(delay, payload) => {
                tokio::time::sleep(delay).await;
                Ok(ComponentOutput::new(payload))
            }
        }
    }
}

/// One recorded invocation window.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The component invoked.
    pub component: String,
    /// When the attempt started.
    pub started: Instant,
    /// When the attempt finished.
    pub finished: Instant,
}

/// Shared log of invocation windows across components.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<Invocation>>>,
}

impl InvocationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded invocations.
    #[must_use]
    pub fn entries(&self) -> Vec<Invocation> {
        self.entries.lock().clone()
    }

    /// Returns the first invocation of a component.
    #[must_use]
    pub fn get(&self, component: &str) -> Option<Invocation> {
        self.entries.lock().iter().find(|i| i.component == component).cloned()
    }

    /// Returns true if the component was invoked.
    #[must_use]
    pub fn contains(&self, component: &str) -> bool {
        self.get(component).is_some()
    }

    fn push(&self, invocation: Invocation) {
        self.entries.lock().push(invocation);
    }
}

/// A component that records its invocation window into a shared log.
#[derive(Debug)]
pub struct RecordingComponent {
    name: String,
    delay: Duration,
    log: InvocationLog,
}

impl RecordingComponent {
    /// Creates a recording component that sleeps `delay` and succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration, log: InvocationLog) -> Self {
        Self {
            name: name.into(),
            delay,
            log,
        }
    }
}

#[async_trait]
impl Component for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        let started = Instant::now();
        tokio::time::sleep(self.delay).await;
        self.log.push(Invocation {
            component: self.name.clone(),
            started,
            finished: Instant::now(),
        });
        Ok(ComponentOutput::new(serde_json::json!({ "component": self.name })))
    }
}
