//! Circuit breaker: three-state safety valve throttling a failing operation
//! (spec §4.E, §3 "Circuit breaker state").
//!
//! Ported from the teacher's `resilience::circuit_breaker` module, narrowed
//! to the exact transition rule spec.md specifies: a single success in
//! `half_open` closes the breaker, a single failure re-opens it (the
//! teacher's `success_threshold` generalization is not part of this spec).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub operation_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u64,
    pub last_failure_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Per-operation circuit breaker. `threshold` and `cooldown` are shared
/// across all operations registered in a [`CircuitBreakerRegistry`]; the
/// spec does not call for per-operation tuning.
#[derive(Debug)]
pub struct CircuitBreaker {
    operation_id: String,
    threshold: u64,
    cooldown: Duration,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    last_failure_time: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl CircuitBreaker {
    fn new(operation_id: impl Into<String>, threshold: u64, cooldown: Duration) -> Self {
        Self {
            operation_id: operation_id.into(),
            threshold,
            cooldown,
            state: AtomicU8::new(CircuitState::Closed.into()),
            consecutive_failures: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            last_failure_time: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Whether a call should be gated right now. Transitions `open` ->
    /// `half_open` once the cooldown has elapsed (spec §4.E step 1 and
    /// §8 invariant 5: stays open until at least `cooldown` has elapsed).
    pub fn should_gate(&self) -> bool {
        if self.state() != CircuitState::Open {
            return false;
        }
        let elapsed = self
            .opened_at
            .read()
            .unwrap()
            .map(|at| at.elapsed() >= self.cooldown)
            .unwrap_or(true);
        if elapsed {
            self.state.store(CircuitState::HalfOpen.into(), Ordering::Release);
            false
        } else {
            true
        }
    }

    pub fn on_success(&self) {
        let previous = self.state();
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(CircuitState::Closed.into(), Ordering::Release);
        if previous != CircuitState::Closed {
            info!(operation_id = %self.operation_id, "circuit breaker closed after success");
        }
    }

    pub fn on_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_failure_time.write().unwrap() = Some(chrono::Utc::now());

        if self.state() == CircuitState::HalfOpen || failures >= self.threshold {
            self.state.store(CircuitState::Open.into(), Ordering::Release);
            *self.opened_at.write().unwrap() = Some(Instant::now());
            warn!(
                operation_id = %self.operation_id,
                failures,
                "circuit breaker opened"
            );
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            operation_id: self.operation_id.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            last_failure_time: *self.last_failure_time.read().unwrap(),
        }
    }

    pub fn reset(&self) {
        self.state.store(CircuitState::Closed.into(), Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        *self.opened_at.write().unwrap() = None;
    }
}

/// Keeps one [`CircuitBreaker`] per operation id, created lazily.
///
/// Per spec §5: "Circuit-breaker table: entries updated under a
/// per-operation-id lock; reads may be lock-free best-effort" — the
/// registry's own lock is held only long enough to get-or-insert the `Arc`,
/// after which every read/write goes through the breaker's own atomics.
pub struct CircuitBreakerRegistry {
    threshold: u64,
    cooldown: Duration,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: u64, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, operation_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(operation_id) {
            return Arc::clone(existing);
        }
        let mut table = self.breakers.write().unwrap();
        Arc::clone(
            table
                .entry(operation_id.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(operation_id, self.threshold, self.cooldown))),
        )
    }

    pub fn snapshot(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.read().unwrap().values().map(|b| b.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures_and_gates_calls() {
        let registry = CircuitBreakerRegistry::new(3, Duration::from_secs(60));
        let breaker = registry.get("op_x");

        for _ in 0..2 {
            breaker.on_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.should_gate());
    }

    #[test]
    fn half_open_closes_on_success_reopens_on_failure() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_millis(1));
        let breaker = registry.get("op_y");
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(!breaker.should_gate());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_operation_id() {
        let registry = CircuitBreakerRegistry::new(5, Duration::from_secs(1));
        let a = registry.get("shared");
        a.on_failure();
        let b = registry.get("shared");
        assert_eq!(b.stats().consecutive_failures, 1);
    }
}
