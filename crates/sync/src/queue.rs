//! The live pending-action queue, mirrored to the durable store.
//!
//! Mutations happen synchronously under a short lock; the resulting queue is
//! then written through to the [`QueueStore`]. Writes are serialized so the
//! last write always carries the latest queue.
//!
//! While a flush is sending, the actions it took form a frozen prefix of the
//! queue. New candidates are only matched against the actions behind that
//! prefix, so nothing the backend may already have received is cancelled.

use std::sync::Mutex;

use crate::action::PendingAction;
use crate::canceller::{self, Admission};
use crate::error::StoreError;
use crate::queue_store::QueueStore;

#[derive(Debug, Default)]
struct Entries {
    actions: Vec<PendingAction>,
    /// Length of the prefix currently being sent.
    in_flight: usize,
}

#[derive(Debug)]
pub struct PendingQueue {
    entries: Mutex<Entries>,
    store: QueueStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl PendingQueue {
    /// Rebuild the queue from the durable record.
    pub async fn restore(store: QueueStore) -> Self {
        let actions = store.load().await;
        if !actions.is_empty() {
            tracing::info!("restored {} pending actions", actions.len());
        }
        Self {
            entries: Mutex::new(Entries {
                actions,
                in_flight: 0,
            }),
            store,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Admit `candidate` (see [`canceller::admit`]) and persist the result.
    ///
    /// The in-memory queue is updated even if persisting fails; the error is
    /// returned so the caller can decide how loudly to report it.
    pub async fn admit(&self, candidate: PendingAction) -> (Admission, Result<(), StoreError>) {
        let _write = self.write_lock.lock().await;
        let (admission, snapshot) = {
            let mut entries = self.lock();
            let split = entries.in_flight;
            let mut open = entries.actions.split_off(split);
            let admission = canceller::admit(&mut open, candidate);
            entries.actions.append(&mut open);
            (admission, entries.actions.clone())
        };
        let persisted = self.store.save(&snapshot).await;
        (admission, persisted)
    }

    /// Freeze the current queue as the batch being sent and return it.
    pub fn begin_flight(&self) -> Vec<PendingAction> {
        let mut entries = self.lock();
        entries.in_flight = entries.actions.len();
        entries.actions.clone()
    }

    /// The batch was not delivered; its actions become cancellable again.
    ///
    /// Actions queued behind the batch were admitted without seeing it, so
    /// they are admitted again against the restored queue. Returns the
    /// queued actions that cancelled out.
    pub async fn abort_flight(&self) -> (Vec<PendingAction>, Result<(), StoreError>) {
        let _write = self.write_lock.lock().await;
        let (cancelled, snapshot) = {
            let mut entries = self.lock();
            let split = entries.in_flight;
            entries.in_flight = 0;
            let behind = entries.actions.split_off(split);
            let mut cancelled = Vec::new();
            for candidate in behind {
                if let Admission::Cancelled(previous) = canceller::admit(&mut entries.actions, candidate) {
                    cancelled.push(previous);
                }
            }
            (cancelled, entries.actions.clone())
        };
        if cancelled.is_empty() {
            return (cancelled, Ok(()));
        }
        tracing::debug!("{} actions cancelled after a failed flush", cancelled.len());
        let persisted = if snapshot.is_empty() {
            self.store.clear().await
        } else {
            self.store.save(&snapshot).await
        };
        (cancelled, persisted)
    }

    /// The batch was delivered: drop it and persist what was queued behind
    /// it. Returns how many actions were removed.
    pub async fn complete_flight(&self) -> (usize, Result<(), StoreError>) {
        let _write = self.write_lock.lock().await;
        let (removed, snapshot) = {
            let mut entries = self.lock();
            let removed = entries.in_flight;
            entries.actions.drain(..removed);
            entries.in_flight = 0;
            (removed, entries.actions.clone())
        };
        let persisted = if snapshot.is_empty() {
            self.store.clear().await
        } else {
            self.store.save(&snapshot).await
        };
        (removed, persisted)
    }

    /// Drop every queued action, in memory and on disk.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let _write = self.write_lock.lock().await;
        let removed = {
            let mut entries = self.lock();
            let removed = entries.actions.len();
            entries.actions.clear();
            entries.in_flight = 0;
            removed
        };
        self.store.clear().await?;
        Ok(removed)
    }

    /// Copy of the current queue, in order.
    pub fn snapshot(&self) -> Vec<PendingAction> {
        self.lock().actions.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().actions.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
