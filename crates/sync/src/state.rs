//! Observable sync status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl core::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// What the UI shows about synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub pending_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            pending_count: 0,
            last_sync_time: None,
            last_error: None,
        }
    }
}

/// Single writer of [`SyncSnapshot`]; readers subscribe to a watch channel.
#[derive(Debug)]
pub(crate) struct SyncStateCell {
    tx: watch::Sender<SyncSnapshot>,
}

impl SyncStateCell {
    pub(crate) fn new(pending_count: usize) -> Self {
        let (tx, _rx) = watch::channel(SyncSnapshot {
            pending_count,
            ..SyncSnapshot::default()
        });
        Self { tx }
    }

    pub(crate) fn current(&self) -> SyncSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn begin(&self) {
        self.tx.send_modify(|s| s.status = SyncStatus::Syncing);
    }

    pub(crate) fn succeed(&self, pending_count: usize, at: DateTime<Utc>) {
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Success;
            s.pending_count = pending_count;
            s.last_sync_time = Some(at);
            s.last_error = None;
        });
    }

    /// The error is kept until the next successful flush.
    pub(crate) fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Error;
            s.last_error = Some(error);
        });
    }

    /// `success -> idle` once the UI has shown the confirmation.
    pub(crate) fn acknowledge(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.status == SyncStatus::Success {
                s.status = SyncStatus::Idle;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn set_pending(&self, pending_count: usize) {
        self.tx.send_if_modified(|s| {
            let changed = s.pending_count != pending_count;
            s.pending_count = pending_count;
            changed
        });
    }
}
