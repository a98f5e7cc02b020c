//! Durable record of the pending-action queue.
//!
//! The whole queue is stored as one JSON array under a single key, in queue
//! order. A record that cannot be read or parsed is discarded on load: a
//! corrupt record must never prevent the client from starting.

use std::sync::Arc;

use crate::action::PendingAction;
use crate::error::StoreError;
use crate::kv_store::KvStore;

/// Key under which the queue record is stored.
pub const QUEUE_KEY: &str = "pending_actions";

#[derive(Clone)]
pub struct QueueStore {
    store: Arc<dyn KvStore>,
    key: String,
}

impl core::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueStore").field("key", &self.key).finish()
    }
}

impl QueueStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            key: QUEUE_KEY.to_string(),
        }
    }

    pub async fn save(&self, queue: &[PendingAction]) -> Result<(), StoreError> {
        let record = serde_json::to_string(queue)?;
        self.store.put(&self.key, &record).await
    }

    /// Load the queue. Missing, unreadable and malformed records all yield an
    /// empty queue; a malformed record is also removed.
    pub async fn load(&self) -> Vec<PendingAction> {
        let record = match self.store.get(&self.key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!("pending-action record unreadable, starting empty: {err}");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<PendingAction>>(&record) {
            Ok(queue) => queue,
            Err(err) => {
                tracing::warn!("discarding malformed pending-action record: {err}");
                if let Err(err) = self.store.delete(&self.key).await {
                    tracing::warn!("failed to remove malformed pending-action record: {err}");
                }
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(&self.key).await
    }
}
