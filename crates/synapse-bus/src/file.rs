//! File-based fallback bus: newline-delimited JSON per queue under a
//! directory (spec §9's second Design Notes bus implementation, for the
//! operational mode where broker and agents run as separate processes).
//!
//! Grounded on the append-then-rewrite newline-delimited-JSON shape of
//! `recovery::journal::wal::WriteAheadLog`, generalized from one
//! write-once log to many poppable queues: popping rewrites the file with
//! the front entry removed rather than truncating and replaying, since this
//! bus is consumed as well as appended to.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use synapse_contracts::BusEnvelope;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::queue::{Bus, QueueSnapshot};
use crate::EnvelopeValidator;
use std::sync::Arc;

struct QueueFiles {
    paused: bool,
}

/// Directory-backed bus. Each queue `name` is a file `<root>/<name>.ndjson`;
/// its dead-letter companion is `<root>/<name>.dead-letter.ndjson`.
pub struct FileBus {
    root: PathBuf,
    validator: Option<Arc<dyn EnvelopeValidator>>,
    state: Mutex<HashMap<String, QueueFiles>>,
    seen_ids: Mutex<HashSet<String>>,
}

impl FileBus {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BusError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| BusError::Io {
            queue: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            validator: None,
            state: Mutex::new(HashMap::new()),
            seen_ids: Mutex::new(HashSet::new()),
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn EnvelopeValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    fn queue_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.ndjson"))
    }

    fn dead_letter_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.dead-letter.ndjson"))
    }

    fn validate(&self, envelope: &BusEnvelope) -> Result<(), BusError> {
        match &self.validator {
            Some(validator) => validator.validate(envelope).map_err(BusError::from),
            None => Ok(()),
        }
    }

    async fn append(&self, path: &Path, envelope: &BusEnvelope) -> Result<(), BusError> {
        let line = serde_json::to_string(envelope).map_err(|e| BusError::Transport {
            queue: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| BusError::Io {
                queue: path.display().to_string(),
                source,
            })?;
        file.write_all(line.as_bytes()).await.map_err(|source| BusError::Io {
            queue: path.display().to_string(),
            source,
        })?;
        file.write_all(b"\n").await.map_err(|source| BusError::Io {
            queue: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    async fn read_all(&self, path: &Path) -> Result<Vec<BusEnvelope>, BusError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| match serde_json::from_str::<BusEnvelope>(l) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "dropping malformed ndjson line");
                        None
                    }
                })
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BusError::Io {
                queue: path.display().to_string(),
                source,
            }),
        }
    }

    async fn write_all(&self, path: &Path, envelopes: &[BusEnvelope]) -> Result<(), BusError> {
        let mut buf = String::new();
        for envelope in envelopes {
            buf.push_str(&serde_json::to_string(envelope).map_err(|e| BusError::Transport {
                queue: path.display().to_string(),
                message: e.to_string(),
            })?);
            buf.push('\n');
        }
        fs::write(path, buf).await.map_err(|source| BusError::Io {
            queue: path.display().to_string(),
            source,
        })
    }

    /// De-duplicate by `request_id` within the payload, per spec §4.C
    /// "duplicates are the consumer's problem and are resolved by
    /// idempotent `request_id` keys" — this bus additionally drops exact
    /// repeats at the transport layer as a courtesy when run in hybrid mode
    /// alongside the in-memory bus, rather than relying solely on consumers.
    async fn already_seen(&self, envelope: &BusEnvelope) -> bool {
        let mut seen = self.seen_ids.lock().await;
        !seen.insert(envelope.id.clone())
    }
}

#[async_trait]
impl Bus for FileBus {
    async fn enqueue(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError> {
        self.validate(&envelope)?;
        if self.already_seen(&envelope).await {
            debug!(queue = name, envelope_id = %envelope.id, "dropping duplicate envelope");
            return Ok(());
        }
        self.append(&self.queue_path(name), &envelope).await
    }

    async fn pop(&self, name: &str, timeout: Duration) -> Result<Option<BusEnvelope>, BusError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let state = self.state.lock().await;
                if state.get(name).map(|q| q.paused).unwrap_or(false) {
                    return Ok(None);
                }
            }

            let path = self.queue_path(name);
            let mut entries = self.read_all(&path).await?;
            if !entries.is_empty() {
                let head = entries.remove(0);
                self.write_all(&path, &entries).await?;
                return Ok(Some(head));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(25).min(deadline - tokio::time::Instant::now())).await;
        }
    }

    async fn queue_depth(&self, name: &str) -> usize {
        self.read_all(&self.queue_path(name)).await.map(|v| v.len()).unwrap_or(0)
    }

    async fn pause(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.entry(name.to_string()).or_insert(QueueFiles { paused: false }).paused = true;
    }

    async fn resume(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.entry(name.to_string()).or_insert(QueueFiles { paused: false }).paused = false;
    }

    async fn is_paused(&self, name: &str) -> bool {
        self.state.lock().await.get(name).map(|q| q.paused).unwrap_or(false)
    }

    async fn dead_letter(&self, name: &str, envelope: BusEnvelope) -> Result<(), BusError> {
        warn!(queue = name, envelope_id = %envelope.id, "moved envelope to dead-letter");
        self.append(&self.dead_letter_path(name), &envelope).await
    }

    async fn drain_dead_letters(&self, name: &str) -> Vec<BusEnvelope> {
        let path = self.dead_letter_path(name);
        let entries = self.read_all(&path).await.unwrap_or_default();
        let _ = fs::remove_file(&path).await;
        entries
    }

    async fn snapshot(&self) -> Vec<QueueSnapshot> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for (name, q) in state.iter() {
            let depth = self.read_all(&self.queue_path(name)).await.map(|v| v.len()).unwrap_or(0);
            let dead_letter_depth = self.read_all(&self.dead_letter_path(name)).await.map(|v| v.len()).unwrap_or(0);
            out.push(QueueSnapshot {
                name: name.clone(),
                depth,
                paused: q.paused,
                dead_letter_depth,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> BusEnvelope {
        BusEnvelope::new(uuid::Uuid::new_v4().to_string(), "test.event", "1.0.0", serde_json::json!({"k": "v"}))
    }

    #[tokio::test]
    async fn enqueue_then_pop_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileBus::new(dir.path()).await.unwrap();
        let sent = envelope();
        bus.enqueue("requests", sent.clone()).await.unwrap();
        assert_eq!(bus.queue_depth("requests").await, 1);

        let popped = bus.pop("requests", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(popped.id, sent.id);
        assert_eq!(bus.queue_depth("requests").await, 0);
    }

    #[tokio::test]
    async fn duplicate_request_id_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileBus::new(dir.path()).await.unwrap();
        let sent = envelope();
        bus.enqueue("requests", sent.clone()).await.unwrap();
        bus.enqueue("requests", sent.clone()).await.unwrap();
        assert_eq!(bus.queue_depth("requests").await, 1);
    }

    #[tokio::test]
    async fn dead_letters_persist_across_drain_calls() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileBus::new(dir.path()).await.unwrap();
        bus.dead_letter("requests", envelope()).await.unwrap();
        assert_eq!(bus.drain_dead_letters("requests").await.len(), 1);
        assert!(bus.drain_dead_letters("requests").await.is_empty());
    }
}
