//! Message bus: named FIFO queues addressed by string keys (spec §4.C).
//!
//! Two implementations share the [`Bus`] trait: [`memory::MemoryBus`], the
//! primary in-process queue, and [`file::FileBus`], a newline-delimited-JSON
//! fallback for the operational mode where the broker and its agents run as
//! separate processes.

pub mod error;
pub mod file;
pub mod memory;
mod queue;

pub use error::BusError;
pub use queue::{BroadcastOutcome, Bus, QueueSnapshot};

use synapse_contracts::BusEnvelope;

/// Well-known queue name for the broker's single global inbox.
pub const REQUESTS_QUEUE: &str = "requests";

/// Queue name for an agent's response inbox (spec §4.C: `responses:<agent>`).
pub fn responses_queue(agent: &str) -> String {
    format!("responses:{agent}")
}

/// Queue name for a queue's dead-letter companion (spec §4.C "failure
/// semantics").
pub fn dead_letter_queue(name: &str) -> String {
    format!("{name}:dead-letter")
}

pub trait EnvelopeValidator: Send + Sync {
    fn validate(&self, envelope: &BusEnvelope) -> Result<(), synapse_contracts::ContractError>;
}

/// Validates every envelope against the bus-envelope schema and the §4.C
/// major-version compatibility rule.
pub struct SchemaValidator;

impl EnvelopeValidator for SchemaValidator {
    fn validate(&self, envelope: &BusEnvelope) -> Result<(), synapse_contracts::ContractError> {
        let value = serde_json::to_value(envelope).map_err(|e| synapse_contracts::ContractError::Validation {
            kind: synapse_contracts::ContractKind::BusEnvelope,
            issues: vec![synapse_contracts::ValidationIssue {
                instance_path: "$".to_string(),
                schema_path: "$".to_string(),
                message: e.to_string(),
            }],
        })?;
        synapse_contracts::validate_bus_envelope_value(&value)?;

        if !synapse_contracts::versions_compatible(&envelope.version, synapse_contracts::ENVELOPE_VERSION) {
            return Err(synapse_contracts::ContractError::VersionMismatch {
                kind: synapse_contracts::ContractKind::BusEnvelope,
                found: envelope.version.clone(),
                expected: synapse_contracts::ENVELOPE_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;
    use std::time::Duration;

    fn envelope(version: &str) -> BusEnvelope {
        BusEnvelope::new(uuid::Uuid::new_v4().to_string(), "request", version, serde_json::json!({}))
    }

    #[test]
    fn accepts_matching_major_version() {
        let validator = SchemaValidator;
        assert!(validator.validate(&envelope(synapse_contracts::ENVELOPE_VERSION)).is_ok());
        assert!(validator.validate(&envelope("1.9.3")).is_ok());
    }

    #[test]
    fn rejects_incompatible_major_version() {
        let validator = SchemaValidator;
        let err = validator.validate(&envelope("2.0.0")).unwrap_err();
        assert!(matches!(err, synapse_contracts::ContractError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn live_bus_drops_incompatible_major_version_on_enqueue() {
        let bus = MemoryBus::with_validator(std::sync::Arc::new(SchemaValidator));
        let result = bus.enqueue(REQUESTS_QUEUE, envelope("9.0.0")).await;
        assert!(result.is_err());
        assert_eq!(bus.queue_depth(REQUESTS_QUEUE).await, 0);

        bus.enqueue(REQUESTS_QUEUE, envelope(synapse_contracts::ENVELOPE_VERSION)).await.unwrap();
        assert!(bus.pop(REQUESTS_QUEUE, Duration::from_millis(50)).await.unwrap().is_some());
    }
}
