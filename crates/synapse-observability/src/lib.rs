//! Structured logging and in-process metrics taps (spec §1.1 ambient
//! stack). Neither module persists anything: logging emits `tracing`
//! events for an injected sink, metrics hold the latest gauge readings in
//! memory for an injected exporter to poll (spec §1: "metrics persistence
//! to disk ... the core emits structured events; these subsystems
//! subscribe").

pub mod logging;
pub mod metrics;

pub use logging::{init as init_logging, LogFormat, LoggingConfig};
pub use metrics::{GaugeReading, MetricsSnapshot, MetricsTap};
