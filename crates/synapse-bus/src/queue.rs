//! The [`Bus`] trait shared by the in-memory and file-based implementations
//! (spec §9: "trait-bounded collaborators instead of concrete cyclic
//! references").

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use synapse_contracts::BusEnvelope;

use crate::error::BusError;

/// Per-name outcome of a [`Bus::broadcast`] call (spec §4.C `broadcast`).
pub type BroadcastOutcome = HashMap<String, Result<(), BusError>>;

/// Observational snapshot of a single queue (spec §4.C `queue_depth`).
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub name: String,
    pub depth: usize,
    pub paused: bool,
    pub dead_letter_depth: usize,
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Append `envelope` to queue `name`. Succeeds even while the queue is
    /// paused (spec §4.C: "enqueue still succeeds").
    async fn enqueue(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError>;

    /// Blocking pop with `timeout`; `None` on timeout or while paused.
    async fn pop(&self, name: &str, timeout: Duration) -> Result<Option<BusEnvelope>, BusError>;

    /// Best-effort fan-out to every name in `names`.
    async fn broadcast(&self, names: &[String], envelope: BusEnvelope) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::new();
        for name in names {
            let result = self.enqueue(name, envelope.clone()).await;
            outcome.insert(name.clone(), result);
        }
        outcome
    }

    /// Observational current depth of queue `name`.
    async fn queue_depth(&self, name: &str) -> usize;

    /// Pause a queue: `pop` returns `None` immediately, `enqueue` is
    /// unaffected.
    async fn pause(&self, name: &str);

    /// Resume a paused queue.
    async fn resume(&self, name: &str);

    async fn is_paused(&self, name: &str) -> bool;

    /// Move `envelope` to `name`'s dead-letter companion (spec §4.C: "a queue
    /// whose processing exhausted all retries").
    async fn dead_letter(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError>;

    /// Drain and return every envelope currently in `name`'s dead-letter
    /// companion.
    async fn drain_dead_letters(&self, name: &str) -> Vec<BusEnvelope>;

    async fn snapshot(&self) -> Vec<QueueSnapshot>;
}
