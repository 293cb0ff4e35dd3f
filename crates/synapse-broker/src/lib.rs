//! LLM-invocation broker (spec §4.B): dispatches queued requests to a
//! single external CLI executable under a concurrency cap, classifies known
//! error signatures in its output, and reacts with session-timeout
//! latching, rate-limit backoff, or the Execute-error continuation
//! sub-protocol.

pub mod broker;
pub mod classify;
pub mod config;
pub mod error;
pub mod process;
pub mod prompt;
pub mod scratch;
pub mod state;
pub mod stats;

pub use broker::Broker;
pub use classify::Outcome;
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use state::BrokerState;
pub use stats::BrokerStatsSnapshot;
