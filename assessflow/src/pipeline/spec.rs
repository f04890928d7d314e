//! Pipeline, stage and component specifications.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use super::{BackoffStrategy, JitterStrategy, RetryPolicy};
use crate::errors::{ConfigError, ContractErrorInfo, CycleDetectedError, PipelineValidationError};

/// Component names: lowercase identifier.
#[allow(clippy::expect_used)]
static COMPONENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("component name regex"));

fn default_timeout_seconds() -> f64 {
    60.0
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_seconds() -> f64 {
    1.0
}

fn default_max_backoff_seconds() -> f64 {
    30.0
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// True for non-negative second counts that fit in a [`Duration`].
fn representable(value: f64) -> bool {
    Duration::try_from_secs_f64(value).is_ok()
}

/// Static description of one component in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Unique name; also the registry key of the implementation.
    pub name: String,
    /// Per-attempt deadline.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Additional attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the backoff between attempts.
    #[serde(default = "default_backoff_base_seconds")]
    pub retry_backoff_base_seconds: f64,
    /// Cap on a single backoff wait.
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: f64,
    /// Backoff growth.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter applied to each wait.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Components that must succeed before this one runs.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// When true, a failure stops the execution.
    #[serde(default)]
    pub fatal: bool,
}

impl ComponentDescriptor {
    /// Creates a descriptor with default timeout and retry settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_backoff_base_seconds: default_backoff_base_seconds(),
            max_backoff_seconds: default_max_backoff_seconds(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
            depends_on: BTreeSet::new(),
            fatal: false,
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.retry_backoff_base_seconds = base.as_secs_f64();
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_seconds = max.as_secs_f64();
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the component as fatal.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_seconds)
    }

    /// Returns the retry policy derived from this descriptor.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_base_delay(secs(self.retry_backoff_base_seconds))
            .with_max_delay(secs(self.max_backoff_seconds))
            .with_backoff(self.backoff)
            .with_jitter(self.jitter)
    }

    /// Validates the descriptor in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed name, a self dependency or an
    /// out-of-range duration.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if !COMPONENT_NAME_RE.is_match(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Invalid component name '{}'",
                self.name
            ))
            .with_components(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-004-NAME", "Component names must match ^[a-z][a-z0-9_]*$")
                    .with_fix_hint("Use lowercase letters, digits and underscores, starting with a letter."),
            ));
        }

        if self.depends_on.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Component '{}' cannot depend on itself",
                self.name
            ))
            .with_components(vec![self.name.clone()]));
        }

        let timeout_ok = self.timeout_seconds > 0.0 && representable(self.timeout_seconds);
        let backoff_ok =
            representable(self.retry_backoff_base_seconds) && representable(self.max_backoff_seconds);
        if !timeout_ok || !backoff_ok {
            return Err(PipelineValidationError::new(format!(
                "Component '{}' has an invalid timeout or backoff",
                self.name
            ))
            .with_components(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-004-VALUE", "Durations must be non-negative and representable")
                    .with_fix_hint("Use a positive timeout_seconds and non-negative backoff values.")
                    .with_context_entry("component", self.name.clone()),
            ));
        }

        Ok(())
    }
}

/// A group of components dispatched together, followed by a barrier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageSpec {
    /// Optional label used in logs and events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The components of the stage.
    pub components: Vec<ComponentDescriptor>,
}

impl StageSpec {
    /// Creates a stage from its components.
    #[must_use]
    pub fn new(components: Vec<ComponentDescriptor>) -> Self {
        Self {
            name: None,
            components,
        }
    }

    /// Sets the stage label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the label, or `stage_<index>` when unnamed.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("stage_{index}"))
    }
}

/// The full orchestration plan: ordered stages plus finishing components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    pub name: String,
    /// Stages in dispatch order.
    pub stages: Vec<StageSpec>,
    /// Components run by the aggregator once the status is known.
    #[serde(default)]
    pub finishing: Vec<ComponentDescriptor>,
}

impl PipelineSpec {
    /// Creates an empty pipeline specification.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            finishing: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a finishing component.
    #[must_use]
    pub fn with_finishing(mut self, descriptor: ComponentDescriptor) -> Self {
        self.finishing.push(descriptor);
        self
    }

    /// Parses and validates a JSON pipeline definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> crate::errors::Result<Self> {
        let spec: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Number of components in the stages (finishing excluded).
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.stages.iter().map(|s| s.components.len()).sum()
    }

    /// Number of components including finishing ones.
    #[must_use]
    pub fn total_component_count(&self) -> usize {
        self.component_count() + self.finishing.len()
    }

    /// Iterates over stage and finishing descriptors.
    pub fn all_descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.stages
            .iter()
            .flat_map(|s| s.components.iter())
            .chain(self.finishing.iter())
    }

    /// Finds a descriptor by name.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.all_descriptors().find(|d| d.name == name)
    }

    /// Validates the whole pipeline.
    ///
    /// Checks names, uniqueness, dependency existence, acyclicity and
    /// that dependencies only point at earlier stages.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }

        if self.component_count() == 0 {
            return Err(PipelineValidationError::new("Pipeline has no components")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot run an empty pipeline")
                        .with_fix_hint("Add at least one stage with one component."),
                ));
        }

        // stage index of every component; finishing sits after the last stage
        let finishing_index = self.stages.len();
        let mut stage_of: HashMap<&str, usize> = HashMap::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.components.is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' has no components",
                    stage.label(index)
                ))
                .with_error_info(ContractErrorInfo::new("CONTRACT-004-EMPTY", "Stages cannot be empty")));
            }
            for descriptor in &stage.components {
                register_descriptor(&mut stage_of, descriptor, index)?;
            }
        }
        for descriptor in &self.finishing {
            register_descriptor(&mut stage_of, descriptor, finishing_index)?;
        }

        for descriptor in self.all_descriptors() {
            for dep in &descriptor.depends_on {
                if !stage_of.contains_key(dep.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Component '{}' depends on unknown component '{}'",
                        descriptor.name, dep
                    ))
                    .with_components(vec![descriptor.name.clone(), dep.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONTRACT-004-MISSING_DEP",
                            format!("Dependency '{dep}' not found"),
                        )
                        .with_fix_hint("Declare the dependency in an earlier stage."),
                    ));
                }
            }
        }

        self.detect_cycles()?;

        for descriptor in self.all_descriptors() {
            let own = stage_of.get(descriptor.name.as_str()).copied().unwrap_or(0);
            for dep in &descriptor.depends_on {
                let dep_stage = stage_of.get(dep.as_str()).copied().unwrap_or(0);
                if dep_stage >= own {
                    return Err(PipelineValidationError::new(format!(
                        "Component '{}' depends on '{}' which is not in an earlier stage",
                        descriptor.name, dep
                    ))
                    .with_components(vec![descriptor.name.clone(), dep.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONTRACT-004-STAGE_ORDER",
                            "Dependencies must point at earlier stages",
                        )
                        .with_fix_hint(format!("Move '{dep}' to a stage before '{}'.", descriptor.name))
                        .with_context_entry("component_stage", own.to_string())
                        .with_context_entry("dependency_stage", dep_stage.to_string()),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let graph: HashMap<&str, &BTreeSet<String>> = self
            .all_descriptors()
            .map(|d| (d.name.as_str(), &d.depends_on))
            .collect();

        let mut names: Vec<&str> = graph.keys().copied().collect();
        names.sort_unstable();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in names {
            if !visited.contains(name) {
                if let Some(cycle) = dfs_cycle(&graph, name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }
}

fn register_descriptor<'a>(
    stage_of: &mut HashMap<&'a str, usize>,
    descriptor: &'a ComponentDescriptor,
    index: usize,
) -> Result<(), PipelineValidationError> {
    descriptor.validate()?;
    if stage_of.insert(descriptor.name.as_str(), index).is_some() {
        return Err(PipelineValidationError::new(format!(
            "Duplicate component name '{}'",
            descriptor.name
        ))
        .with_components(vec![descriptor.name.clone()])
        .with_error_info(
            ContractErrorInfo::new("CONTRACT-004-DUPLICATE", "Component names must be unique")
                .with_fix_hint("Rename one of the components."),
        ));
    }
    Ok(())
}

fn dfs_cycle<'a>(
    graph: &HashMap<&'a str, &'a BTreeSet<String>>,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(&deps) = graph.get(node) {
        for dep in deps {
            let dep = dep.as_str();
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(graph, dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}
