//! Recovery primitive: retry with backoff, circuit breakers, and fallback
//! handling (spec §4.E). Every other component in the core executes its
//! risky operations — a bus pop, a child-process invocation, a health
//! probe's `heal()` — through [`execute_with_recovery`].

pub mod circuit_breaker;
pub mod error_pattern;
pub mod recovery;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState};
pub use error_pattern::{ErrorPatternRecord, ErrorPatternStore};
pub use recovery::{execute_with_recovery, BoxFuture, FallbackFn, RecoveryPolicy, RecoveryReport};
pub use retry::RetryStrategy;
