use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build layered configuration: {0}")]
    Build(#[source] config::ConfigError),

    #[error("failed to serialize configuration: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}
