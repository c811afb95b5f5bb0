//! Live challenge watching
//!
//! Bridges gateway document subscriptions to caller-supplied handlers. Each
//! delivered snapshot is the complete post-write document (replace, not
//! merge), so a handler can always overwrite its local copy wholesale.
//! Watches are keyed by challenge id; re-watching an id replaces the prior
//! watch, and dropping the watcher tears everything down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::gateway::{collections, CancelHandle, DocumentGateway};
use crate::model::{Challenge, ChallengeId};

struct WatchEntry {
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

/// Registry of live per-challenge subscriptions.
pub struct ChallengeWatcher {
    gateway: Arc<dyn DocumentGateway>,
    watches: Mutex<HashMap<ChallengeId, WatchEntry>>,
}

impl ChallengeWatcher {
    pub fn new(gateway: Arc<dyn DocumentGateway>) -> Self {
        Self {
            gateway,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching a challenge, invoking `handler` with each full
    /// snapshot. An existing watch for the same id is cancelled first.
    pub async fn watch<F>(&self, challenge_id: &str, handler: F) -> Result<()>
    where
        F: Fn(Challenge) + Send + Sync + 'static,
    {
        if challenge_id.is_empty() {
            return Err(EngineError::InvalidInput("empty challenge id".into()));
        }

        let mut subscription = self
            .gateway
            .subscribe_doc(collections::CHALLENGES, challenge_id)
            .await
            .map_err(EngineError::Commit)?;
        let cancel = subscription.cancel_handle();

        let id = challenge_id.to_string();
        let task = tokio::spawn(async move {
            while let Some(change) = subscription.next().await {
                match serde_json::from_value::<Challenge>(change.fields) {
                    Ok(challenge) => handler(challenge),
                    Err(e) => {
                        // A snapshot that no longer parses means the document
                        // was mangled out of band; skip it rather than kill
                        // the watch.
                        warn!(challenge_id = %id, error = %e, "Skipping unparseable challenge snapshot");
                    }
                }
            }
            debug!(challenge_id = %id, "Challenge watch ended");
        });

        let entry = WatchEntry { cancel, task };
        let previous = {
            let mut watches = self
                .watches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            watches.insert(challenge_id.to_string(), entry)
        };
        if let Some(prev) = previous {
            prev.cancel.cancel();
            prev.task.abort();
        }
        Ok(())
    }

    /// Stop watching a challenge. A no-op for ids with no live watch.
    pub fn unwatch(&self, challenge_id: &str) {
        let entry = {
            let mut watches = self
                .watches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            watches.remove(challenge_id)
        };
        if let Some(entry) = entry {
            entry.cancel.cancel();
            debug!(challenge_id = %challenge_id, "Challenge watch cancelled");
        }
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Drop for ChallengeWatcher {
    fn drop(&mut self) {
        let watches = {
            let mut guard = self
                .watches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for (_, entry) in watches {
            entry.cancel.cancel();
            entry.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryGateway, WriteBatch};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout, Duration};

    fn challenge_doc(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "from": "alice",
            "to": "bob",
            "fromName": "Alice",
            "toName": "Bob",
            "challengeText": "50 burpees",
            "wagerAmount": 0.0,
            "expiryDays": 7,
            "status": status,
        })
    }

    #[tokio::test]
    async fn test_watch_delivers_full_snapshots() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .commit(WriteBatch::new().create(
                collections::CHALLENGES,
                "ch-1",
                challenge_doc("ch-1", "pending"),
            ))
            .await
            .unwrap();

        let watcher = ChallengeWatcher::new(gateway.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        watcher
            .watch("ch-1", move |challenge| {
                let _ = tx.send(challenge.status);
            })
            .await
            .unwrap();

        gateway
            .commit(WriteBatch::new().update(
                collections::CHALLENGES,
                "ch-1",
                json!({ "status": "accepted" }),
            ))
            .await
            .unwrap();

        let status = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(status, crate::model::ChallengeStatus::Accepted);
    }

    #[tokio::test]
    async fn test_unwatch_stops_delivery() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .commit(WriteBatch::new().create(
                collections::CHALLENGES,
                "ch-1",
                challenge_doc("ch-1", "pending"),
            ))
            .await
            .unwrap();

        let watcher = ChallengeWatcher::new(gateway.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        watcher
            .watch("ch-1", move |_| {
                seen_in_handler.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(watcher.watch_count(), 1);

        watcher.unwatch("ch-1");
        assert_eq!(watcher.watch_count(), 0);
        // Give the watch task time to observe cancellation
        sleep(Duration::from_millis(50)).await;

        gateway
            .commit(WriteBatch::new().update(
                collections::CHALLENGES,
                "ch-1",
                json!({ "status": "accepted" }),
            ))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rewatch_replaces_previous() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .commit(WriteBatch::new().create(
                collections::CHALLENGES,
                "ch-1",
                challenge_doc("ch-1", "pending"),
            ))
            .await
            .unwrap();

        let watcher = ChallengeWatcher::new(gateway.clone());
        let first = Arc::new(AtomicUsize::new(0));
        let first_in_handler = first.clone();
        watcher
            .watch("ch-1", move |_| {
                first_in_handler.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        watcher
            .watch("ch-1", move |challenge| {
                let _ = tx.send(challenge.id);
            })
            .await
            .unwrap();
        assert_eq!(watcher.watch_count(), 1);
        sleep(Duration::from_millis(50)).await;

        gateway
            .commit(WriteBatch::new().update(
                collections::CHALLENGES,
                "ch-1",
                json!({ "status": "negotiating" }),
            ))
            .await
            .unwrap();

        let id = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(id, "ch-1");
        assert_eq!(first.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_all_watches() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .commit(WriteBatch::new().create(
                collections::CHALLENGES,
                "ch-1",
                challenge_doc("ch-1", "pending"),
            ))
            .await
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        {
            let watcher = ChallengeWatcher::new(gateway.clone());
            let seen_in_handler = seen.clone();
            watcher
                .watch("ch-1", move |_| {
                    seen_in_handler.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(50)).await;

        gateway
            .commit(WriteBatch::new().update(
                collections::CHALLENGES,
                "ch-1",
                json!({ "status": "accepted" }),
            ))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
