//! Rolling 24h healing history (spec §4.D "rolling history (24h)").
//!
//! Grounded on the sliding-window accounting in the teacher's
//! `system-health-monitor::core::ErrorRateTracker`: a `VecDeque` of
//! timestamped events with old entries dropped on every insert rather than
//! on a separate sweep.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingEvent {
    pub probe_id: String,
    pub successful: bool,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct HealingHistory {
    window: ChronoDuration,
    events: RwLock<VecDeque<HealingEvent>>,
}

impl HealingHistory {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::hours(24)),
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record(&self, probe_id: impl Into<String>, successful: bool, detail: Option<String>) {
        let mut events = self.events.write();
        events.push_back(HealingEvent {
            probe_id: probe_id.into(),
            successful,
            detail,
            timestamp: Utc::now(),
        });
        let cutoff = Utc::now() - self.window;
        while let Some(front) = events.front() {
            if front.timestamp < cutoff {
                events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn events(&self) -> Vec<HealingEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// `healing_successful` / `healing_failed` rate over the retained
    /// window (spec §4.D "Reporting": "recovery success rate").
    pub fn success_rate(&self) -> f64 {
        let events = self.events.read();
        if events.is_empty() {
            return 0.0;
        }
        let successes = events.iter().filter(|e| e.successful).count();
        successes as f64 / events.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_reflects_recorded_outcomes() {
        let history = HealingHistory::new(std::time::Duration::from_secs(3600));
        history.record("memory", true, None);
        history.record("memory", false, Some("still over threshold".to_string()));
        assert_eq!(history.success_rate(), 0.5);
        assert_eq!(history.events().len(), 2);
    }

    #[test]
    fn empty_history_reports_zero_not_nan() {
        let history = HealingHistory::new(std::time::Duration::from_secs(3600));
        assert_eq!(history.success_rate(), 0.0);
    }
}
