//! Inbound Delivery Queue (spec section 4.5): a durable FIFO over a
//! single JSON file with TTL/attempt-cap eviction and debounced
//! persistence.
//!
//! The debounce discipline is the explicit channel form spec.md section
//! 9 asks for: a single writer task drains a bounded(1) "dirty" channel,
//! coalescing bursts of `enqueue`/`dequeue`/`incrementAttempts` into one
//! write in flight. File I/O itself is grounded on
//! `cas::store::FileStore`'s `fs::write`/`fs::read` discipline, adapted
//! from content-addressed blobs to one queue file.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use signal::QueuedDelivery;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to read queue file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write queue file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// In-memory queue state plus the path it persists to. Held behind a
/// `Mutex` since mutation always happens from whichever tokio task
/// handles the inbound message or the retry loop — contention is low and
/// the critical sections never await.
pub struct InboundQueue {
    path: PathBuf,
    entries: Mutex<Vec<QueuedDelivery>>,
    dirty_tx: mpsc::Sender<()>,
}

impl InboundQueue {
    /// Load from `path` if present, apply TTL/attempt-cap cleanup, and
    /// spawn the debounced writer task. Parse failure is non-fatal — the
    /// queue starts empty and logs a warning, matching spec section 4.5's
    /// "Parse failure is non-fatal" load rule.
    pub fn load(path: PathBuf) -> std::sync::Arc<Self> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<QueuedDelivery>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "queue file failed to parse, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "queue file unreadable, starting empty");
                Vec::new()
            }
        };

        let loaded = entries.len();
        let now = Utc::now();
        let entries: Vec<QueuedDelivery> = entries.into_iter().filter(|e| !e.is_expired(now)).collect();
        tracing::info!(
            path = %path.display(),
            loaded,
            retained = entries.len(),
            "inbound queue loaded"
        );

        let (dirty_tx, dirty_rx) = mpsc::channel(1);
        let queue = std::sync::Arc::new(Self {
            path,
            entries: Mutex::new(entries),
            dirty_tx,
        });

        spawn_writer(queue.clone(), dirty_rx);
        queue
    }

    fn mark_dirty(&self) {
        // Non-blocking: a burst of mutations collapses to one pending
        // write, per the debounce discipline in spec.md section 9.
        let _ = self.dirty_tx.try_send(());
    }

    pub fn enqueue(&self, payload: signal::NormalizedInboundMessage) {
        let entry = QueuedDelivery::new(payload);
        self.entries.lock().unwrap().push(entry);
        self.mark_dirty();
    }

    /// Removes all entries matching `message_id` (at most one, by the
    /// key invariant).
    pub fn dequeue(&self, message_id: &str) {
        self.entries.lock().unwrap().retain(|e| e.message_id != message_id);
        self.mark_dirty();
    }

    pub fn increment_attempts(&self, message_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.message_id == message_id) {
            entry.attempts += 1;
        }
        drop(entries);
        self.mark_dirty();
    }

    pub fn list(&self) -> Vec<QueuedDelivery> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts entries past the attempt cap or TTL. Called after every
    /// drain pass and on load.
    pub fn cleanup(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            tracing::info!(removed, "inbound queue cleanup evicted expired entries");
            self.mark_dirty();
        }
    }

    fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        let entries = self.entries.lock().unwrap();
        serde_json::to_string_pretty(&*entries)
    }

    /// Synchronous write for shutdown, bypassing the debounce channel.
    pub fn persist_sync(&self) -> Result<(), QueueError> {
        let json = self.snapshot_json().expect("QueuedDelivery always serializes");
        std::fs::write(&self.path, json).map_err(|source| QueueError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Single-writer task: blocks on the dirty channel, writes the current
/// snapshot, and — since sends are collapsed via `try_send` — re-checks
/// for another pending signal before going back to sleep, so a write
/// that arrived mid-flush is not lost.
fn spawn_writer(queue: std::sync::Arc<InboundQueue>, mut dirty_rx: mpsc::Receiver<()>) {
    tokio::spawn(async move {
        while dirty_rx.recv().await.is_some() {
            if let Err(e) = queue.persist_sync() {
                tracing::warn!(error = %e, "inbound queue persistence failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal::{MessageKind, NormalizedInboundMessage};

    fn message(id: &str) -> NormalizedInboundMessage {
        NormalizedInboundMessage {
            provider: "p1".into(),
            tenant_id: "t1".into(),
            message_id: id.into(),
            from: "+14155550000".into(),
            resolved_phone: Some("+14155550000".into()),
            is_opaque_address: false,
            opaque_address_id: None,
            timestamp: 1_700_000_000,
            kind: MessageKind::Text,
            content: "hello".into(),
            push_name: None,
            is_voice: false,
            voice_transcript: None,
            voice_duration_seconds: None,
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_leaves_length_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        assert_eq!(queue.len(), 0);

        queue.enqueue(message("m1"));
        assert_eq!(queue.len(), 1);

        queue.dequeue("m1");
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn enqueue_then_persist_then_load_roundtrips_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let queue = InboundQueue::load(path.clone());

        queue.enqueue(message("m1"));
        queue.enqueue(message("m2"));
        queue.persist_sync().unwrap();

        let reloaded = InboundQueue::load(path);
        let mut ids: Vec<String> = reloaded.list().into_iter().map(|e| e.message_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string()]);
        assert!(reloaded.list().iter().all(|e| e.attempts == 0));
    }

    #[tokio::test]
    async fn cleanup_evicts_attempt_capped_entries() {
        let dir = tempfile::tempdir().unwrap();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        queue.enqueue(message("m1"));
        for _ in 0..signal::MAX_ATTEMPTS {
            queue.increment_attempts("m1");
        }

        queue.cleanup();
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn load_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "not json").unwrap();

        let queue = InboundQueue::load(path);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn mutation_eventually_flushes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let queue = InboundQueue::load(path.clone());

        queue.enqueue(message("m1"));
        // Give the debounced writer task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("m1"));
    }
}
