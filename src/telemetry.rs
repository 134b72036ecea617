//! Logging initialization
//!
//! Installs a global `tracing` subscriber with an `EnvFilter` and either JSON
//! or human-readable output. Library code only emits events; whichever binary
//! embeds the controller decides whether to call [`init_logging`].

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,emr_cluster=debug";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// The rejected directive
        filter: String,
        /// Parser message
        message: String,
    },

    /// A global subscriber is already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
}

/// Configuration for logging initialization
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directive; `RUST_LOG` wins when set, then this, then [`DEFAULT_FILTER`]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: None,
        }
    }
}

/// Install the global subscriber
///
/// Fails if the filter is malformed or a subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(&config)?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        filter: directive.to_string(),
        message: e.to_string(),
    })
}
