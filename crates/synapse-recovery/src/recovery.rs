//! `execute_with_recovery`: the single entry point every other component
//! uses to run a risky operation (spec §4.E).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use synapse_contracts::{CoreError, ErrorKind};
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error_pattern::ErrorPatternStore;
use crate::retry::{delay_for_attempt, RetryStrategy};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type FallbackFn<T> = Arc<dyn Fn(&CoreError) -> BoxFuture<'static, Result<T, CoreError>> + Send + Sync>;

/// Retry/circuit-breaker/fallback policy (spec §4.E contract).
#[derive(Clone)]
pub struct RecoveryPolicy<T> {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    pub circuit_breaker: bool,
    pub backoff_multiplier: f64,
    /// Optional fallback invoked on exhaustion (spec: "fallback (id or
    /// callable)"). This crate takes the callable form directly; a
    /// component that wants id-based dispatch resolves the id to a closure
    /// before constructing the policy.
    pub fallback: Option<FallbackFn<T>>,
}

impl<T> Default for RecoveryPolicy<T> {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            circuit_breaker: true,
            backoff_multiplier: 2.0,
            fallback: None,
        }
    }
}

/// Outcome metadata returned alongside the value/error, used by callers that
/// need to populate `attempts` on a response envelope (spec §3).
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub attempts: u32,
    pub used_fallback: bool,
}

/// Run `do_op` under the recovery contract described in spec §4.E:
///
/// 1. Fail fast with `CircuitOpen` if the breaker for `operation_id` is open
///    and cooldown has not elapsed.
/// 2. Retry up to `policy.max_retries` times, classifying each failure and
///    stopping early on a non-recoverable kind.
/// 3. On exhaustion, invoke the fallback if one is registered; its error (if
///    any) propagates instead of the original.
pub async fn execute_with_recovery<F, Fut, T>(
    operation_id: &str,
    breakers: &CircuitBreakerRegistry,
    patterns: Option<&ErrorPatternStore>,
    policy: &RecoveryPolicy<T>,
    mut do_op: F,
) -> (Result<T, CoreError>, RecoveryReport)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let breaker = breakers.get(operation_id);

    if policy.circuit_breaker && breaker.should_gate() {
        let err = CoreError::new(
            ErrorKind::CircuitOpen,
            format!("circuit breaker for '{operation_id}' is open"),
        );
        return run_fallback(policy, err, 0).await;
    }

    let mut last_error: Option<CoreError> = None;
    let mut attempts_used = 0u32;

    for attempt in 1..=policy.max_retries.max(1) {
        attempts_used = attempt;
        match do_op().await {
            Ok(value) => {
                if policy.circuit_breaker {
                    breaker.on_success();
                }
                return (
                    Ok(value),
                    RecoveryReport {
                        attempts: attempts_used,
                        used_fallback: false,
                    },
                );
            }
            Err(error) => {
                if policy.circuit_breaker {
                    breaker.on_failure();
                }
                if let Some(store) = patterns {
                    store.record_failure(operation_id, &error.message, Some(attempt));
                }

                if !error.kind.is_recoverable() {
                    warn!(operation_id, kind = %error.kind, "non-recoverable error, stopping retries");
                    last_error = Some(error);
                    break;
                }

                if attempt >= policy.max_retries {
                    last_error = Some(error);
                    break;
                }

                let delay = delay_for_attempt(
                    policy.strategy,
                    attempt,
                    policy.base_delay,
                    policy.max_delay,
                    policy.backoff_multiplier,
                    policy.jitter_factor,
                );
                info!(operation_id, attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");
                tokio::time::sleep(delay).await;
                last_error = Some(error);
            }
        }
    }

    let final_error = last_error.unwrap_or_else(|| CoreError::new(ErrorKind::Unknown, "operation failed with no recorded error"));
    run_fallback(policy, final_error, attempts_used).await
}

async fn run_fallback<T>(
    policy: &RecoveryPolicy<T>,
    error: CoreError,
    attempts_used: u32,
) -> (Result<T, CoreError>, RecoveryReport) {
    match &policy.fallback {
        Some(fallback) => {
            let outcome = fallback(&error).await;
            (
                outcome,
                RecoveryReport {
                    attempts: attempts_used,
                    used_fallback: true,
                },
            )
        }
        None => (
            Err(error),
            RecoveryReport {
                attempts: attempts_used,
                used_fallback: false,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(3, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let breakers = registry();
        let policy = RecoveryPolicy {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let (result, report) = execute_with_recovery(
            "op",
            &breakers,
            None,
            &policy,
            || async { Ok::<_, CoreError>(42) },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let breakers = registry();
        let policy = RecoveryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let (result, report) = execute_with_recovery("op", &breakers, None, &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::new(ErrorKind::NetworkError, "connection reset"))
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_recoverable_error() {
        let breakers = registry();
        let policy = RecoveryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let (result, report) = execute_with_recovery("op", &breakers, None, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(CoreError::new(ErrorKind::InputError, "file not found")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(report.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_calling_op() {
        let breakers = registry();
        let breaker = breakers.get("flaky");
        for _ in 0..3 {
            breaker.on_failure();
        }
        let policy = RecoveryPolicy {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let (result, _report) = execute_with_recovery("flaky", &breakers, None, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CoreError>(1) }
        })
        .await;
        assert!(matches!(result.unwrap_err().kind, ErrorKind::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_is_invoked_after_exhaustion() {
        let breakers = registry();
        let policy = RecoveryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            fallback: Some(Arc::new(|_err| Box::pin(async { Ok(7) }))),
            ..Default::default()
        };
        let (result, report) = execute_with_recovery("op", &breakers, None, &policy, || async {
            Err::<i32, _>(CoreError::new(ErrorKind::NetworkError, "still failing"))
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert!(report.used_fallback);
    }
}
