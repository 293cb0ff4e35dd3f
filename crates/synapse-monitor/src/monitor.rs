//! The monitor orchestrator (spec §4.D): runs every enabled probe on a
//! cadence, heals unhealthy probes through the recovery primitive with an
//! emergency-healing fallback, and generates periodic reports.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use synapse_recovery::{
    execute_with_recovery, CircuitBreakerRegistry, ErrorPatternStore, RecoveryPolicy, RetryStrategy,
};

use crate::config::MonitorConfig;
use crate::governor::HealingGovernor;
use crate::history::HealingHistory;
use crate::probe::{Probe, ProbeReport};
use crate::report::MonitorReport;

const ERROR_PATTERN_CAPACITY: usize = 256;

pub struct Monitor {
    config: MonitorConfig,
    probes: Vec<Arc<dyn Probe>>,
    breakers: CircuitBreakerRegistry,
    patterns: ErrorPatternStore,
    governor: HealingGovernor,
    history: HealingHistory,
    latest: DashMap<String, ProbeReport>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, probes: Vec<Arc<dyn Probe>>) -> Arc<Self> {
        let history = HealingHistory::new(Duration::from_secs(24 * 3600));
        let governor = HealingGovernor::new(config.heal_cooldown, config.heal_attempt_cap);
        let breakers =
            CircuitBreakerRegistry::new(config.circuit_breaker_threshold, config.circuit_breaker_cooldown);
        Arc::new(Self {
            breakers,
            patterns: ErrorPatternStore::new(ERROR_PATTERN_CAPACITY),
            governor,
            history,
            latest: DashMap::new(),
            config,
            probes,
        })
    }

    /// Drive the probe cadence and the reporting cadence concurrently until
    /// the returned task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut probe_ticker = tokio::time::interval(self.config.check_interval);
        let mut report_ticker = tokio::time::interval(self.config.report_interval);
        loop {
            tokio::select! {
                _ = probe_ticker.tick() => {
                    self.check_all().await;
                }
                _ = report_ticker.tick() => {
                    let report = self.latest_report();
                    tracing::info!(
                        recovery_success_rate = report.recovery_success_rate,
                        top_error_patterns = report.top_error_patterns.len(),
                        "monitor periodic report"
                    );
                }
            }
        }
    }

    /// Observable control surface: "trigger immediate probe" (spec §6).
    pub async fn check_all(&self) -> Vec<(String, ProbeReport)> {
        let mut results = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            if !probe.enabled() {
                continue;
            }
            let report = probe.check().await;
            self.latest.insert(probe.id().to_string(), report.clone());
            if !report.healthy {
                self.patterns.record_failure(
                    probe.id(),
                    report.error.as_deref().unwrap_or("probe reported unhealthy"),
                    None,
                );
                if self.governor.allow(probe.id()) {
                    self.governor.record_attempt(probe.id());
                    self.attempt_heal(Arc::clone(probe)).await;
                }
            }
            results.push((probe.id().to_string(), report));
        }
        results
    }

    async fn attempt_heal(&self, probe: Arc<dyn Probe>) {
        let operation_id = format!("heal:{}", probe.id());
        let probe_id = probe.id().to_string();
        let policy = RecoveryPolicy::<()> {
            max_retries: 1,
            strategy: RetryStrategy::Linear,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
            jitter_factor: 0.0,
            circuit_breaker: true,
            backoff_multiplier: 1.0,
            fallback: Some(Arc::new(move |_err| {
                let probe_id = probe_id.clone();
                Box::pin(async move {
                    tracing::error!(probe_id, "emergency healing: escalating after primary heal failed");
                    Ok(())
                })
            })),
        };

        let (result, report) = execute_with_recovery(&operation_id, &self.breakers, Some(&self.patterns), &policy, || {
            let probe = Arc::clone(&probe);
            async move { probe.heal().await }
        })
        .await;

        self.history.record(probe.id(), result.is_ok(), result.err().map(|e| e.message));
        if report.used_fallback {
            tracing::warn!(probe_id = probe.id(), "primary heal exhausted, emergency fallback ran");
        }
    }

    /// Observable control surface: "get latest report" (spec §6).
    pub fn latest_report(&self) -> MonitorReport {
        let probes: Vec<(String, ProbeReport)> = self
            .latest
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        MonitorReport::new(
            self.history.success_rate(),
            self.breakers.snapshot(),
            self.patterns.top_n(5),
            &probes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use synapse_contracts::CoreError;

    struct FlakyProbe {
        healthy: AtomicBool,
        heal_calls: AtomicU32,
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        fn id(&self) -> &str {
            "flaky"
        }
        fn name(&self) -> &str {
            "flaky test probe"
        }
        async fn check(&self) -> ProbeReport {
            if self.healthy.load(Ordering::SeqCst) {
                ProbeReport::healthy(Default::default())
            } else {
                ProbeReport::unhealthy(Default::default(), "flaky probe is down")
            }
        }
        async fn heal(&self) -> Result<(), CoreError> {
            self.heal_calls.fetch_add(1, Ordering::SeqCst);
            self.healthy.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unhealthy_probe_triggers_heal_and_recovers() {
        let probe = Arc::new(FlakyProbe {
            healthy: AtomicBool::new(false),
            heal_calls: AtomicU32::new(0),
        });
        let monitor = Monitor::new(MonitorConfig::default(), vec![probe.clone()]);

        let results = monitor.check_all().await;
        assert!(!results[0].1.healthy);
        assert!(probe.heal_calls.load(Ordering::SeqCst) >= 1);

        let results = monitor.check_all().await;
        assert!(results[0].1.healthy);
    }

    #[tokio::test]
    async fn latest_report_reflects_healing_history() {
        let probe = Arc::new(FlakyProbe {
            healthy: AtomicBool::new(false),
            heal_calls: AtomicU32::new(0),
        });
        let monitor = Monitor::new(MonitorConfig::default(), vec![probe]);
        monitor.check_all().await;
        let report = monitor.latest_report();
        assert!(report.recovery_success_rate > 0.0);
    }
}
