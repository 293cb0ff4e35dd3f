//! Exported broker statistics (spec §4.B "Statistics").

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct BrokerStats {
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    session_timeouts: AtomicU64,
    rate_limits: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatsSnapshot {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub session_timeouts: u64,
    pub rate_limits: u64,
    pub success_rate: f64,
    pub error_rate: f64,
}

impl BrokerStats {
    pub fn record_success(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_timeout(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.session_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit(&self) {
        self.rate_limits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let (success_rate, error_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (successes as f64 / total as f64, failures as f64 / total as f64)
        };
        BrokerStatsSnapshot {
            total,
            successes,
            failures,
            session_timeouts: self.session_timeouts.load(Ordering::Relaxed),
            rate_limits: self.rate_limits.load(Ordering::Relaxed),
            success_rate,
            error_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_error_rate_reflect_totals() {
        let stats = BrokerStats::default();
        stats.record_success();
        stats.record_success();
        stats.record_failure();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.error_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_report_zero_rates_not_nan() {
        let stats = BrokerStats::default();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.error_rate, 0.0);
    }
}
