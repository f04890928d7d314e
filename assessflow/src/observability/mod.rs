//! Logging setup and execution spans.
//!
//! The engine logs through `tracing` macros everywhere. Binaries embedding
//! it call [`init_tracing`] once at startup; libraries and tests can skip
//! it and install their own subscriber.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::{ExecutionId, SubjectId};
use crate::errors::ConfigError;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid("log_format", format!("unknown format '{other}'"))),
        }
    }
}

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().with_current_span(true).try_init().is_ok(),
    }
}

/// The span every execution is driven in.
pub fn execution_span(execution_id: ExecutionId, subject_id: &SubjectId, pipeline: &str) -> Span {
    info_span!(
        "execution",
        execution_id = %execution_id,
        subject_id = %subject_id,
        pipeline = %pipeline,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(LogFormat::Text);
        assert!(!init_tracing(LogFormat::Json));
    }
}
