//! Periodic report (spec §4.D "Reporting"): "every N minutes generates a
//! report with recovery success rate, circuit-breaker summary, and top-5
//! error patterns".

use chrono::{DateTime, Utc};
use serde::Serialize;
use synapse_recovery::{CircuitBreakerStats, ErrorPatternRecord};

use crate::probe::ProbeReport;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub generated_at: DateTime<Utc>,
    pub recovery_success_rate: f64,
    pub circuit_breakers: Vec<CircuitBreakerStats>,
    pub top_error_patterns: Vec<ErrorPatternRecord>,
    pub probes: Vec<(String, bool)>,
}

impl MonitorReport {
    pub fn new(
        recovery_success_rate: f64,
        circuit_breakers: Vec<CircuitBreakerStats>,
        top_error_patterns: Vec<ErrorPatternRecord>,
        probes: &[(String, ProbeReport)],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            recovery_success_rate,
            circuit_breakers,
            top_error_patterns,
            probes: probes.iter().map(|(id, report)| (id.clone(), report.healthy)).collect(),
        }
    }
}
