//! Broker-local errors (spec §4.B, §7).

use synapse_contracts::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker is latched in session_timeout; call reset_session first")]
    SessionTimeout,
    #[error("broker is rate_limited until {unlock_time_ms}")]
    RateLimited { unlock_time_ms: i64 },
    #[error("broker is shutting down, no new dispatches are accepted")]
    ShuttingDown,
    #[error("failed to spawn child process: {0}")]
    Spawn(String),
    #[error("child process timed out after {0:?}")]
    ProcessTimeout(std::time::Duration),
    #[error("child process exited with status {0}: {1}")]
    ProcessCrashed(i32, String),
    #[error("failed to materialize scratch file '{0}': {1}")]
    Scratch(String, String),
}

impl From<BrokerError> for CoreError {
    fn from(err: BrokerError) -> Self {
        let kind = match &err {
            BrokerError::SessionTimeout => ErrorKind::SessionTimeout,
            BrokerError::RateLimited { .. } => ErrorKind::RateLimit,
            BrokerError::ShuttingDown => ErrorKind::TransportError,
            BrokerError::Spawn(_) => ErrorKind::ProcessCrashed,
            BrokerError::ProcessTimeout(_) => ErrorKind::ProcessTimeout,
            BrokerError::ProcessCrashed(_, _) => ErrorKind::ProcessCrashed,
            BrokerError::Scratch(_, _) => ErrorKind::Unknown,
        };
        CoreError::new(kind, err.to_string())
    }
}
