//! Background task that starts flushes without a caller asking.
//!
//! Two triggers:
//! - a debounce timer, re-armed by every enqueue, that fires once the user
//!   has been quiet for the configured period (skipped while offline);
//! - connectivity coming back while actions are queued.
//!
//! Failed flushes are not retried here. The next enqueue or reconnect re-arms
//! the worker.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::offline::ConnectivityState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Debounce,
    Reconnect,
}

/// What the worker drives.
#[async_trait]
pub(crate) trait AutoFlush: Send + Sync + 'static {
    fn has_pending(&self) -> bool;

    async fn auto_flush(&self, trigger: Trigger);
}

/// Handle to the running worker.
#[derive(Debug)]
pub(crate) struct SyncWorker {
    kick: Arc<Notify>,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncWorker {
    /// Spawn the worker. It stops on [`SyncWorker::shutdown`] or once the
    /// target is gone.
    pub(crate) fn start(
        target: Weak<dyn AutoFlush>,
        debounce: Duration,
        connectivity: watch::Receiver<ConnectivityState>,
    ) -> Self {
        let kick = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        let task = tokio::spawn(run(target, debounce, connectivity, kick.clone(), shutdown.clone()));

        Self {
            kick,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Re-arm the debounce timer.
    pub(crate) fn kick(&self) {
        self.kick.notify_one();
    }

    /// Stop the worker and wait for it to finish. A flush already running
    /// completes first.
    pub(crate) async fn shutdown(&self) {
        self.shutdown.notify_one();
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("sync worker ended abnormally: {e}");
            }
        }
    }
}

async fn run(
    target: Weak<dyn AutoFlush>,
    debounce: Duration,
    mut connectivity: watch::Receiver<ConnectivityState>,
    kick: Arc<Notify>,
    shutdown: Arc<Notify>,
) {
    tracing::info!(?debounce, "sync worker started");

    let mut deadline: Option<Instant> = None;
    let mut last_state = *connectivity.borrow_and_update();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                tracing::debug!("sync worker received shutdown signal");
                break;
            }

            _ = kick.notified() => {
                deadline = Some(Instant::now() + debounce);
            }

            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow_and_update();
                let restored = last_state == ConnectivityState::Offline
                    && state == ConnectivityState::Online;
                last_state = state;

                if restored {
                    let Some(target) = target.upgrade() else { break };
                    if target.has_pending() {
                        tracing::info!("connectivity restored; flushing pending actions");
                        deadline = None;
                        target.auto_flush(Trigger::Reconnect).await;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if last_state == ConnectivityState::Offline {
                    tracing::debug!("debounce elapsed while offline; waiting for reconnect");
                    continue;
                }
                let Some(target) = target.upgrade() else { break };
                target.auto_flush(Trigger::Debounce).await;
            }
        }
    }

    tracing::info!("sync worker stopped");
}
