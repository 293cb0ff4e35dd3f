//! Structured logging init (spec §1.1 ambient stack).
//!
//! The core never writes directly to a file or external sink — spec.md §1
//! calls logging sinks "injected; the core treats them as opaque
//! services" — it only emits structured `tracing` events. This module owns
//! process-wide subscriber initialization, trimmed from the teacher's
//! `observability::logging::StructuredLogger` (no file rotation, no
//! `enable_file_logging`: that's the sink, not the core).

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted ahead of [`LoggingConfig::level`], mirroring
/// the teacher's `AGENT_LOG_LEVEL` convention (`observability/src/logging.rs`).
pub const LOG_LEVEL_ENV: &str = "SYNAPSE_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, for machine consumption.
    Json,
    /// Human-readable multi-line, for local development.
    Pretty,
    /// Human-readable single-line.
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Install the global `tracing` subscriber. Idempotent in the sense that a
/// second call in the same process returns an error rather than panicking
/// (tests that need a subscriber should use `tracing_subscriber`'s
/// `with_default` test helpers instead of calling this twice).
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_current_span(false).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => subscriber.with(fmt::layer().compact()).try_init(),
    }
}
