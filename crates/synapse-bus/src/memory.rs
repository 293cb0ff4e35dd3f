//! In-memory bus: `tokio::sync::Mutex`-guarded `VecDeque`s keyed by queue
//! name (spec §9: "typed channels instead of string-keyed emitters" applied
//! at the envelope layer, while the queue *names* themselves stay
//! string-keyed per spec §4.C's literal contract).
//!
//! Grounded on the `BinaryHeap`/queue-per-key shape of
//! `orchestration::frontier::Frontier`, generalized from one priority queue
//! to many named FIFO queues, each with its own pause flag and dead-letter
//! companion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use synapse_contracts::BusEnvelope;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::BusError;
use crate::queue::{Bus, QueueSnapshot};
use crate::EnvelopeValidator;

struct QueueState {
    entries: VecDeque<BusEnvelope>,
    dead_letters: VecDeque<BusEnvelope>,
    paused: bool,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            dead_letters: VecDeque::new(),
            paused: false,
            notify: Arc::new(Notify::new()),
        }
    }
}

/// The primary, in-process [`Bus`] implementation.
pub struct MemoryBus {
    queues: Mutex<HashMap<String, QueueState>>,
    validator: Option<Arc<dyn EnvelopeValidator>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            validator: None,
        }
    }

    pub fn with_validator(validator: Arc<dyn EnvelopeValidator>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            validator: Some(validator),
        }
    }

    fn validate(&self, envelope: &BusEnvelope) -> Result<(), BusError> {
        match &self.validator {
            Some(validator) => validator.validate(envelope).map_err(BusError::from),
            None => Ok(()),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn enqueue(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError> {
        self.validate(&envelope)?;
        let mut queues = self.queues.lock().await;
        let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
        state.entries.push_back(envelope);
        state.notify.notify_one();
        debug!(queue = name, depth = state.entries.len(), "enqueued envelope");
        Ok(())
    }

    async fn pop(&self, name: &str, timeout: Duration) -> Result<Option<BusEnvelope>, BusError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = {
                let mut queues = self.queues.lock().await;
                let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
                if state.paused {
                    return Ok(None);
                }
                if let Some(envelope) = state.entries.pop_front() {
                    return Ok(Some(envelope));
                }
                Arc::clone(&state.notify)
            };

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            tokio::select! {
                _ = notify.notified() => continue,
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn queue_depth(&self, name: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(name)
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    async fn pause(&self, name: &str) {
        let mut queues = self.queues.lock().await;
        queues.entry(name.to_string()).or_insert_with(QueueState::new).paused = true;
    }

    async fn resume(&self, name: &str) {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
        state.paused = false;
        state.notify.notify_waiters();
    }

    async fn is_paused(&self, name: &str) -> bool {
        self.queues.lock().await.get(name).map(|s| s.paused).unwrap_or(false)
    }

    async fn dead_letter(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
        warn!(queue = name, envelope_id = %envelope.id, "moved envelope to dead-letter");
        state.dead_letters.push_back(envelope);
        Ok(())
    }

    async fn drain_dead_letters(&self, name: &str) -> Vec<BusEnvelope> {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(name) {
            Some(state) => state.dead_letters.drain(..).collect(),
            None => Vec::new(),
        }
    }

    async fn snapshot(&self) -> Vec<QueueSnapshot> {
        let queues = self.queues.lock().await;
        queues
            .iter()
            .map(|(name, state)| QueueSnapshot {
                name: name.clone(),
                depth: state.entries.len(),
                paused: state.paused,
                dead_letter_depth: state.dead_letters.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_contracts::BusEnvelope;

    fn envelope() -> BusEnvelope {
        BusEnvelope::new(uuid::Uuid::new_v4().to_string(), "test.event", "1.0.0", serde_json::json!({"k": "v"}))
    }

    #[tokio::test]
    async fn pop_returns_enqueued_envelope_fifo() {
        let bus = MemoryBus::new();
        let first = envelope();
        let second = envelope();
        bus.enqueue("requests", first.clone()).await.unwrap();
        bus.enqueue("requests", second.clone()).await.unwrap();

        let popped = bus.pop("requests", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(popped.id, first.id);
        let popped2 = bus.pop("requests", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(popped2.id, second.id);
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let bus = MemoryBus::new();
        let result = bus.pop("requests", Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn paused_queue_accepts_enqueue_but_pop_returns_none() {
        let bus = MemoryBus::new();
        bus.pause("requests").await;
        bus.enqueue("requests", envelope()).await.unwrap();
        assert_eq!(bus.queue_depth("requests").await, 1);
        let result = bus.pop("requests", Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());

        bus.resume("requests").await;
        let result = bus.pop("requests", Duration::from_millis(20)).await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn broadcast_reports_per_name_outcome() {
        let bus = MemoryBus::new();
        let names = vec!["responses:a".to_string(), "responses:b".to_string()];
        let outcome = bus.broadcast(&names, envelope()).await;
        assert_eq!(outcome.len(), 2);
        assert!(outcome.values().all(|r| r.is_ok()));
        assert_eq!(bus.queue_depth("responses:a").await, 1);
    }

    #[tokio::test]
    async fn dead_letters_are_drained_once() {
        let bus = MemoryBus::new();
        bus.dead_letter("requests", envelope()).await.unwrap();
        let drained = bus.drain_dead_letters("requests").await;
        assert_eq!(drained.len(), 1);
        assert!(bus.drain_dead_letters("requests").await.is_empty());
    }
}
