//! Engine and orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::errors::{ConfigError, Result};
use crate::pipeline::PipelineSpec;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum component invocations in flight across all executions.
    #[serde(default = "default_global_concurrency_limit")]
    pub global_concurrency_limit: usize,
    /// How long terminal executions stay pollable.
    #[serde(default = "default_status_retention_window_seconds")]
    pub status_retention_window_seconds: u64,
    /// Maximum terminal executions kept before the oldest are dropped.
    #[serde(default = "default_max_retained_executions")]
    pub max_retained_executions: usize,
    /// Minimum success rate for `partially_completed`.
    #[serde(default = "default_partial_success_threshold")]
    pub partial_success_threshold: f64,
    /// Period of the status janitor, when spawned.
    #[serde(default = "default_janitor_interval_seconds")]
    pub janitor_interval_seconds: u64,
    /// Deadline for loading a subject context before the execution fails.
    #[serde(default = "default_context_load_timeout_seconds")]
    pub context_load_timeout_seconds: f64,
}

fn default_global_concurrency_limit() -> usize {
    8
}

fn default_status_retention_window_seconds() -> u64 {
    3600
}

fn default_max_retained_executions() -> usize {
    1000
}

fn default_partial_success_threshold() -> f64 {
    0.5
}

fn default_janitor_interval_seconds() -> u64 {
    60
}

fn default_context_load_timeout_seconds() -> f64 {
    30.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_concurrency_limit: default_global_concurrency_limit(),
            status_retention_window_seconds: default_status_retention_window_seconds(),
            max_retained_executions: default_max_retained_executions(),
            partial_success_threshold: default_partial_success_threshold(),
            janitor_interval_seconds: default_janitor_interval_seconds(),
            context_load_timeout_seconds: default_context_load_timeout_seconds(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.global_concurrency_limit = limit;
        self
    }

    /// Sets the retention window.
    #[must_use]
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.status_retention_window_seconds = window.as_secs();
        self
    }

    /// Sets the retained execution cap.
    #[must_use]
    pub fn with_max_retained(mut self, max: usize) -> Self {
        self.max_retained_executions = max;
        self
    }

    /// Sets the partial success threshold.
    #[must_use]
    pub fn with_partial_success_threshold(mut self, threshold: f64) -> Self {
        self.partial_success_threshold = threshold;
        self
    }

    /// Sets the subject context load deadline.
    #[must_use]
    pub fn with_context_load_timeout(mut self, timeout: Duration) -> Self {
        self.context_load_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Gets the retention window as a Duration.
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.status_retention_window_seconds)
    }

    /// Gets the janitor period as a Duration.
    #[must_use]
    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_seconds.max(1))
    }

    /// Gets the subject context load deadline as a Duration.
    #[must_use]
    pub fn context_load_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.context_load_timeout_seconds).unwrap_or(Duration::MAX)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first out-of-range field.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.global_concurrency_limit == 0 {
            return Err(ConfigError::invalid("global_concurrency_limit", "must be at least 1"));
        }
        if self.global_concurrency_limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "global_concurrency_limit",
                format!("must be at most {}", Semaphore::MAX_PERMITS),
            ));
        }
        if !(0.0..=1.0).contains(&self.partial_success_threshold) {
            return Err(ConfigError::invalid(
                "partial_success_threshold",
                "must be within [0, 1]",
            ));
        }
        if self.context_load_timeout_seconds <= 0.0
            || Duration::try_from_secs_f64(self.context_load_timeout_seconds).is_err()
        {
            return Err(ConfigError::invalid(
                "context_load_timeout_seconds",
                "must be a positive, representable number of seconds",
            ));
        }
        Ok(())
    }
}

/// A complete deployment definition: engine settings plus the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// The pipeline to run for every subject.
    pub pipeline: PipelineSpec,
}

impl OrchestratorConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or any section is
    /// invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        config.engine.validate()?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }
}
