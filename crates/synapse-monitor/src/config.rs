//! Monitor tuning knobs (spec §4.D).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Cadence at which every enabled probe is checked.
    pub check_interval: Duration,
    /// Cadence at which a report is generated (spec §4.D "Reporting").
    pub report_interval: Duration,
    /// Per-probe minimum spacing between `heal()` attempts.
    pub heal_cooldown: Duration,
    /// Per-probe cap on attempts within `heal_cooldown` (spec §4.D
    /// "Healing control").
    pub heal_attempt_cap: u32,
    pub memory_warning_percent: f64,
    pub cpu_warning_percent: f64,
    pub disk_warning_percent: f64,
    pub log_directory: PathBuf,
    /// Consecutive failures on a `heal()` operation's circuit breaker
    /// before it opens (spec §4.E, shared across every probe's
    /// `operation_id`).
    pub circuit_breaker_threshold: u64,
    pub circuit_breaker_cooldown: Duration,
    /// Environment variable the dependency-health probe checks for
    /// presence (spec §4.D "dependency health": "presence of
    /// credentials/reachability signals").
    pub dependency_credential_env_var: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            report_interval: Duration::from_secs(300),
            heal_cooldown: Duration::from_secs(60),
            heal_attempt_cap: 3,
            memory_warning_percent: 85.0,
            cpu_warning_percent: 90.0,
            disk_warning_percent: 90.0,
            log_directory: PathBuf::from("logs"),
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_secs(60),
            dependency_credential_env_var: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}
