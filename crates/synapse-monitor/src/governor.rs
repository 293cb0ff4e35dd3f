//! Per-probe healing cooldown and attempt cap (spec §4.D "Healing
//! control"): "a per-probe cooldown prevents rapid repeated attempts" and
//! "a per-probe cap on attempts within the cooldown window bounds churn".

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Window {
    opened_at: Instant,
    attempts: u32,
}

/// Tracks, per probe id, how many healing attempts have happened within the
/// current cooldown window.
pub struct HealingGovernor {
    cooldown: Duration,
    attempt_cap: u32,
    windows: DashMap<String, Window>,
}

impl HealingGovernor {
    pub fn new(cooldown: Duration, attempt_cap: u32) -> Self {
        Self {
            cooldown,
            attempt_cap,
            windows: DashMap::new(),
        }
    }

    /// Whether `probe_id` may attempt a heal right now.
    pub fn allow(&self, probe_id: &str) -> bool {
        match self.windows.get(probe_id) {
            Some(window) if window.opened_at.elapsed() < self.cooldown => window.attempts < self.attempt_cap,
            _ => true,
        }
    }

    /// Record that a heal attempt happened, starting a fresh window if the
    /// previous one has expired.
    pub fn record_attempt(&self, probe_id: &str) {
        let mut entry = self.windows.entry(probe_id.to_string()).or_insert_with(|| Window {
            opened_at: Instant::now(),
            attempts: 0,
        });
        if entry.opened_at.elapsed() >= self.cooldown {
            entry.opened_at = Instant::now();
            entry.attempts = 0;
        }
        entry.attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_attempts_within_cooldown_window() {
        let governor = HealingGovernor::new(Duration::from_secs(60), 2);
        assert!(governor.allow("memory"));
        governor.record_attempt("memory");
        assert!(governor.allow("memory"));
        governor.record_attempt("memory");
        assert!(!governor.allow("memory"));
    }

    #[test]
    fn window_resets_once_cooldown_elapses() {
        let governor = HealingGovernor::new(Duration::from_millis(10), 1);
        governor.record_attempt("disk");
        assert!(!governor.allow("disk"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(governor.allow("disk"));
    }
}
