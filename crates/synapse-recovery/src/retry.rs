//! Retry delay formulas (spec §4.E): linear, exponential backoff, and
//! Fibonacci, each clamped to `max_delay` with bounded additive jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Linear,
    ExponentialBackoff,
    Fibonacci,
}

/// `fib(1) = 1, fib(2) = 1, fib(3) = 2, fib(4) = 3, ...`
fn fib(n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    b
}

/// Base delay for `attempt` (numbered from 1), before jitter.
///
/// Resolves the spec §9 open question about `pow(2, attempt)` off-by-one:
/// `exponential_backoff` uses `base_delay * multiplier^(attempt - 1)`, so
/// attempt 1 waits exactly `base_delay`, not `multiplier * base_delay`.
pub fn base_delay(
    strategy: RetryStrategy,
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
) -> Duration {
    let attempt = attempt.max(1);
    let base_ms = base_delay.as_millis() as f64;
    let raw_ms = match strategy {
        RetryStrategy::Linear => base_ms * attempt as f64,
        RetryStrategy::ExponentialBackoff => base_ms * multiplier.powi(attempt as i32 - 1),
        RetryStrategy::Fibonacci => base_ms * fib(attempt) as f64,
    };
    let clamped_ms = raw_ms.min(max_delay.as_millis() as f64).max(0.0);
    Duration::from_millis(clamped_ms as u64)
}

/// Apply bounded additive jitter: `delay + delay * jitter_factor * (rand - 0.5)`,
/// then re-clamp to `max_delay` so the boundary property in spec §8 holds
/// ("delay function is <= max_delay for every attempt") regardless of which
/// side of the jitter range was drawn.
pub fn with_jitter(delay: Duration, jitter_factor: f64, max_delay: Duration) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }
    let delay_ms = delay.as_millis() as f64;
    let jitter_range = delay_ms * jitter_factor;
    let jitter = rand::thread_rng().gen_range(-0.5..=0.5) * jitter_range;
    let jittered_ms = (delay_ms + jitter).max(0.0).min(max_delay.as_millis() as f64);
    Duration::from_millis(jittered_ms as u64)
}

/// Convenience: compute the final, jittered delay for an attempt.
pub fn delay_for_attempt(
    strategy: RetryStrategy,
    attempt: u32,
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
) -> Duration {
    let raw = base_delay(strategy, attempt, base, max, multiplier);
    with_jitter(raw, jitter_factor, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_first_attempt_equals_base_delay() {
        let d = base_delay(
            RetryStrategy::ExponentialBackoff,
            1,
            Duration::from_millis(100),
            Duration::from_secs(30),
            2.0,
        );
        assert_eq!(d, Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(30);
        assert_eq!(base_delay(RetryStrategy::ExponentialBackoff, 2, base, max, 2.0), Duration::from_millis(200));
        assert_eq!(base_delay(RetryStrategy::ExponentialBackoff, 3, base, max, 2.0), Duration::from_millis(400));
    }

    #[test]
    fn linear_scales_with_attempt_number() {
        let base = Duration::from_millis(50);
        let max = Duration::from_secs(30);
        assert_eq!(base_delay(RetryStrategy::Linear, 3, base, max, 2.0), Duration::from_millis(150));
    }

    #[test]
    fn fibonacci_matches_sequence() {
        let base = Duration::from_millis(10);
        let max = Duration::from_secs(30);
        assert_eq!(base_delay(RetryStrategy::Fibonacci, 1, base, max, 2.0), Duration::from_millis(10));
        assert_eq!(base_delay(RetryStrategy::Fibonacci, 4, base, max, 2.0), Duration::from_millis(30));
    }

    #[test]
    fn delay_never_exceeds_max_delay_even_with_jitter() {
        let max = Duration::from_millis(500);
        for attempt in 1..10 {
            let d = delay_for_attempt(RetryStrategy::ExponentialBackoff, attempt, Duration::from_millis(100), max, 2.0, 0.5);
            assert!(d <= max, "attempt {attempt} produced {d:?} > {max:?}");
        }
    }
}
