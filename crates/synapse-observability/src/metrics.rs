//! In-process metrics taps (spec §1 "the core emits structured events;
//! these subsystems subscribe" — metrics *persistence* to disk is out of
//! scope, but the core still exposes gauges/counters for whatever exporter
//! an operator wires up).
//!
//! Trimmed from the teacher's `observability::metrics::MetricsCollector`
//! (counters/gauges/histograms over a label set): this crate drops the
//! generic label-keyed API and instead exposes named `record_*` taps for
//! exactly the three snapshot shapes the core produces, since those are
//! the only producers this workspace has.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use synapse_broker::BrokerStatsSnapshot;
use synapse_monitor::MonitorReport;
use synapse_scheduler::SchedulerSnapshot;
use tokio::sync::RwLock;

/// A single named gauge reading taken at `observed_at`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeReading {
    pub value: f64,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

/// Point-in-time export of every gauge the taps have recorded, keyed by a
/// dotted metric name (`scheduler.queue_depth`, `broker.success_rate`, ...).
#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub gauges: HashMap<String, GaugeReading>,
}

/// Process-wide metrics sink. Cheap to clone (wraps an `Arc`); intended to
/// be constructed once and shared between the scheduler, broker, and
/// monitor's periodic taps.
#[derive(Clone)]
pub struct MetricsTap {
    gauges: Arc<RwLock<HashMap<String, GaugeReading>>>,
}

impl MetricsTap {
    pub fn new() -> Self {
        Self {
            gauges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn set(&self, name: impl Into<String>, value: f64) {
        self.gauges.write().await.insert(
            name.into(),
            GaugeReading {
                value,
                observed_at: chrono::Utc::now(),
            },
        );
    }

    /// Tap a scheduler snapshot (spec §4.A `snapshot()`): queue depth,
    /// running count, and per-project health score.
    pub async fn record_scheduler_snapshot(&self, snapshot: &SchedulerSnapshot) {
        self.set("scheduler.queued_depth", snapshot.queued.len() as f64).await;
        self.set("scheduler.running_count", snapshot.running.len() as f64).await;
        self.set("scheduler.project_count", snapshot.projects.len() as f64).await;
        for health in &snapshot.health {
            self.set(format!("scheduler.project.{}.health_score", health.project_id), health.score)
                .await;
        }
    }

    /// Tap the broker's exported statistics (spec §4.B "Statistics").
    pub async fn record_broker_stats(&self, stats: &BrokerStatsSnapshot) {
        self.set("broker.total", stats.total as f64).await;
        self.set("broker.successes", stats.successes as f64).await;
        self.set("broker.failures", stats.failures as f64).await;
        self.set("broker.session_timeouts", stats.session_timeouts as f64).await;
        self.set("broker.rate_limits", stats.rate_limits as f64).await;
        self.set("broker.success_rate", stats.success_rate).await;
        self.set("broker.error_rate", stats.error_rate).await;
    }

    /// Tap the monitor's periodic report (spec §4.D "Reporting").
    pub async fn record_monitor_report(&self, report: &MonitorReport) {
        self.set("monitor.recovery_success_rate", report.recovery_success_rate).await;
        self.set("monitor.open_circuit_breakers", {
            report
                .circuit_breakers
                .iter()
                .filter(|b| b.state == synapse_recovery::CircuitState::Open)
                .count() as f64
        })
        .await;
        let unhealthy = report.probes.iter().filter(|(_, healthy)| !healthy).count();
        self.set("monitor.unhealthy_probes", unhealthy as f64).await;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gauges: self.gauges.read().await.clone(),
        }
    }
}

impl Default for MetricsTap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broker_stats_tap_populates_named_gauges() {
        let tap = MetricsTap::new();
        tap.record_broker_stats(&BrokerStatsSnapshot {
            total: 10,
            successes: 8,
            failures: 2,
            session_timeouts: 0,
            rate_limits: 1,
            success_rate: 0.8,
            error_rate: 0.2,
        })
        .await;

        let snapshot = tap.snapshot().await;
        assert_eq!(snapshot.gauges["broker.total"].value, 10.0);
        assert_eq!(snapshot.gauges["broker.success_rate"].value, 0.8);
    }
}
