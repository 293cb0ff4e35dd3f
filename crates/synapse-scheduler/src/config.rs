//! Scheduler tuning constants (spec §9: "fair-share tokens and aging boost
//! constants are not explicit in the source; pick defaults and expose them
//! as configuration").

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Interval at which a queued task's age contributes another
    /// `aging_increment` to its effective priority (spec §4.A step 1).
    pub aging_interval: Duration,
    /// Priority points added per `aging_interval` elapsed.
    pub aging_increment: f64,
    /// Upper bound on the total age-derived boost.
    pub aging_cap: f64,
    /// Ceiling on a project's accumulated fair-share tokens, so a long-idle
    /// project cannot monopolize the scheduler on return (spec §4.A
    /// "Fair-share token scheme").
    pub max_burst: f64,
    /// System-wide resource ceiling, independent of any single project's
    /// quota (spec §4.A "Resource-quota gate").
    pub global_cpu_limit: f64,
    pub global_memory_limit: f64,
    /// Health-score penalty weights (spec §4.A "Health scoring").
    pub health_backlog_penalty_per_task: f64,
    pub health_cpu_penalty_scale: f64,
    pub health_memory_penalty_scale: f64,
    pub health_failure_rate_penalty_scale: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            aging_interval: Duration::from_secs(10),
            aging_increment: 20.0,
            aging_cap: 60.0,
            max_burst: 5.0,
            global_cpu_limit: 32.0,
            global_memory_limit: 65536.0,
            health_backlog_penalty_per_task: 2.0,
            health_cpu_penalty_scale: 40.0,
            health_memory_penalty_scale: 40.0,
            health_failure_rate_penalty_scale: 50.0,
        }
    }
}
