//! Broker state machine (spec §4.B): `running`, `rate_limited(until)`,
//! `session_timeout`, `shutting_down`.
//!
//! The spec's transitions carry data (`until`) so a plain atomic tag is not
//! enough; this mirrors `synapse_recovery::CircuitBreaker`'s shape (an
//! atomic fast path plus a lock for the rare payload-bearing transition)
//! rather than its exact representation.

use std::sync::RwLock;

use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Running,
    /// `until` is epoch milliseconds; new dispatches are deferred until then.
    RateLimited { until_ms: i64 },
    /// Latching: no child process is spawned until `reset_session`.
    SessionTimeout,
    ShuttingDown,
}

#[derive(Debug)]
pub struct BrokerStateCell {
    inner: RwLock<BrokerState>,
}

impl Default for BrokerStateCell {
    fn default() -> Self {
        Self {
            inner: RwLock::new(BrokerState::Running),
        }
    }
}

impl BrokerStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> BrokerState {
        *self.inner.read().unwrap()
    }

    pub fn set_running(&self) {
        *self.inner.write().unwrap() = BrokerState::Running;
    }

    pub fn set_rate_limited(&self, until_ms: i64) {
        *self.inner.write().unwrap() = BrokerState::RateLimited { until_ms };
    }

    pub fn set_session_timeout(&self) {
        *self.inner.write().unwrap() = BrokerState::SessionTimeout;
    }

    pub fn set_shutting_down(&self) {
        *self.inner.write().unwrap() = BrokerState::ShuttingDown;
    }

    pub fn is_session_timeout(&self) -> bool {
        matches!(self.get(), BrokerState::SessionTimeout)
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(self.get(), BrokerState::ShuttingDown)
    }

    /// `Some(until_ms)` when still gated; transitions back to `Running`
    /// internally once `until_ms` has passed (spec §4.B step 3).
    pub fn rate_limit_gate(&self) -> Option<i64> {
        let state = self.get();
        match state {
            BrokerState::RateLimited { until_ms } => {
                if Utc::now().timestamp_millis() >= until_ms {
                    self.set_running();
                    None
                } else {
                    Some(until_ms)
                }
            }
            _ => None,
        }
    }

    /// `reset_session` per the observable control surface (spec §6).
    pub fn reset_session(&self) {
        let mut guard = self.inner.write().unwrap();
        if matches!(*guard, BrokerState::SessionTimeout) {
            *guard = BrokerState::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_timeout_latches_until_explicit_reset() {
        let cell = BrokerStateCell::new();
        cell.set_session_timeout();
        assert!(cell.is_session_timeout());
        cell.reset_session();
        assert_eq!(cell.get(), BrokerState::Running);
    }

    #[test]
    fn reset_session_is_a_no_op_outside_session_timeout() {
        let cell = BrokerStateCell::new();
        cell.set_rate_limited(i64::MAX);
        cell.reset_session();
        assert_eq!(cell.get(), BrokerState::RateLimited { until_ms: i64::MAX });
    }

    #[test]
    fn rate_limit_gate_clears_once_elapsed() {
        let cell = BrokerStateCell::new();
        cell.set_rate_limited(0);
        assert_eq!(cell.rate_limit_gate(), None);
        assert_eq!(cell.get(), BrokerState::Running);
    }
}
