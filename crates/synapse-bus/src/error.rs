//! Bus-level errors (spec §4.C "Failure semantics").

use synapse_contracts::{ContractError, CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("queue '{0}' is paused")]
    QueuePaused(String),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("transport failure on queue '{queue}': {message}")]
    Transport { queue: String, message: String },
    #[error("io error on queue '{queue}': {source}")]
    Io {
        queue: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<BusError> for CoreError {
    fn from(err: BusError) -> Self {
        let kind = match &err {
            BusError::Contract(_) => ErrorKind::ValidationError,
            BusError::QueuePaused(_) => ErrorKind::TransportError,
            BusError::Transport { .. } | BusError::Io { .. } => ErrorKind::TransportError,
        };
        CoreError::new(kind, err.to_string())
    }
}
