//! Broker tuning knobs (spec §4.B).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Path or name of the external CLI executable ("the model process").
    pub command: String,
    /// Concurrency cap enforced by a semaphore (spec §4.B step 4).
    pub max_concurrent: usize,
    /// Used when a request's `context.timeout` is absent.
    pub default_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL on expiry.
    pub kill_grace: Duration,
    /// Fixed buffer added to a parsed rate-limit epoch before dispatch
    /// resumes (spec §4.B step 9: "a fixed 60 s buffer").
    pub rate_limit_grace_ms: i64,
    /// Root directory under which per-request scratch directories are
    /// created (spec §4.B step 5).
    pub scratch_root: PathBuf,
    pub default_model: Option<String>,
    pub default_fallback_model: Option<String>,
    /// Retry policy applied to the Execute-error continuation sub-protocol
    /// (spec §4.B "Recovery sub-protocol").
    pub max_retries: u32,
    /// Consecutive failures on the continuation sub-protocol's circuit
    /// breaker before it opens (spec §4.E, shared by every `operation_id`
    /// this broker drives through `execute_with_recovery`).
    pub circuit_breaker_threshold: u64,
    /// Cooldown before an open breaker moves to `half_open`.
    pub circuit_breaker_cooldown: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            max_concurrent: 4,
            default_timeout: Duration::from_secs(120),
            kill_grace: Duration::from_secs(5),
            rate_limit_grace_ms: 60_000,
            scratch_root: std::env::temp_dir().join("synapse-broker"),
            default_model: None,
            default_fallback_model: None,
            max_retries: 3,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_secs(60),
        }
    }
}
