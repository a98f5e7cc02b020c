//! Flushes the pending queue to the backend.
//!
//! A flush takes the whole queue as one batch, splits it by destination and
//! sends the profile group, then the content group. Either both succeed and
//! the batch leaves the queue, or the whole batch stays queued for the next
//! attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use crinz_core::ContentId;
use crinz_events::InMemoryEventBus;

use crate::action::{Action, Destination, PendingAction};
use crate::credentials::{CredentialProvider, Credentials};
use crate::error::SyncError;
use crate::queue::PendingQueue;
use crate::state::SyncStateCell;
use crate::stats_cache::StatsCache;
use crate::temp_ids::TempIdResolver;
use crate::transport::{
    ActionTransport, ContentAction, ContentBatch, ContentPayload, ContentReceipt, ProfileAction,
    ProfileBatch,
};
use crate::types::SyncEvent;

/// Why a flush request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another flush is still running.
    InProgress,
    EmptyQueue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed(FlushReport),
    Skipped(SkipReason),
}

impl FlushOutcome {
    pub fn is_flushed(&self) -> bool {
        matches!(self, FlushOutcome::Flushed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub profile_actions: usize,
    pub content_actions: usize,
    /// Comments that received their backend id in this flush.
    pub resolved_comments: usize,
}

impl FlushReport {
    pub fn total(&self) -> usize {
        self.profile_actions + self.content_actions
    }
}

/// The engine state a flush reads and updates.
pub(crate) struct FlushScope<'a> {
    pub queue: &'a PendingQueue,
    pub temp_ids: &'a TempIdResolver,
    pub stats: &'a StatsCache,
    pub state: &'a SyncStateCell,
    pub events: &'a InMemoryEventBus<SyncEvent>,
}

pub struct BatchDispatcher {
    transport: Arc<dyn ActionTransport>,
    credentials: Arc<dyn CredentialProvider>,
    max_batch_size: usize,
    in_progress: AtomicBool,
}

impl core::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("max_batch_size", &self.max_batch_size)
            .field("in_progress", &self.is_flushing())
            .finish()
    }
}

/// Clears the in-progress flag on every exit path.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchDispatcher {
    pub fn new(
        transport: Arc<dyn ActionTransport>,
        credentials: Arc<dyn CredentialProvider>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            transport,
            credentials,
            max_batch_size,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn is_flushing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub(crate) async fn flush(&self, scope: FlushScope<'_>) -> Result<FlushOutcome, SyncError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("flush already in progress");
            return Ok(FlushOutcome::Skipped(SkipReason::InProgress));
        }
        let _guard = InProgress(&self.in_progress);

        let batch = scope.queue.begin_flight();
        if batch.is_empty() {
            return Ok(FlushOutcome::Skipped(SkipReason::EmptyQueue));
        }

        scope.state.begin();

        if batch.len() > self.max_batch_size {
            let err = SyncError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            };
            return Err(Self::abort(&scope, None, err).await);
        }

        let Some(credentials) = self.credentials.credentials() else {
            return Err(Self::abort(&scope, None, SyncError::Unauthenticated).await);
        };

        tracing::info!("flushing {} pending actions", batch.len());

        let (report, receipt) = match self.send(&batch, &credentials, scope.temp_ids).await {
            Ok(sent) => sent,
            Err(err) => {
                let destination = match &err {
                    SyncError::Transport { destination, .. } => Some(*destination),
                    _ => None,
                };
                return Err(Self::abort(&scope, destination, err).await);
            }
        };

        let (removed, persisted) = scope.queue.complete_flight().await;

        let mut report = report;
        for created in receipt.created_comments {
            if !created.temp_id.is_temporary() {
                continue;
            }
            let target = batch.iter().find_map(|a| match &a.action {
                Action::AddComment { comment_id, .. } if *comment_id == created.temp_id => Some(&a.target_id),
                _ => None,
            });
            let Some(target) = target else {
                tracing::warn!(temp_id = %created.temp_id, "receipt names a comment this batch did not create");
                continue;
            };
            scope
                .temp_ids
                .resolve(target, created.temp_id.clone(), created.comment_id.clone());
            report.resolved_comments += 1;
            scope.events.notify(SyncEvent::CommentResolved {
                temporary: created.temp_id,
                confirmed: created.comment_id,
            });
        }

        // A reaction queued behind the batch is still unconfirmed.
        let remaining = scope.queue.snapshot();
        let reacted: Vec<&ContentId> = batch
            .iter()
            .filter(|a| a.kind().is_reaction())
            .filter(|a| {
                !remaining
                    .iter()
                    .any(|r| r.kind().is_reaction() && r.target_id == a.target_id)
            })
            .map(|a| &a.target_id)
            .collect();
        scope.stats.settle(reacted);

        // The batch was delivered, but a restart would send it again.
        if let Err(e) = persisted {
            scope.state.set_pending(scope.queue.len());
            return Err(Self::report_failure(&scope, None, SyncError::Store(e)));
        }

        let at = Utc::now();
        scope.state.succeed(scope.queue.len(), at);
        scope.events.notify(SyncEvent::FlushSucceeded {
            actions: removed,
            at,
        });

        tracing::info!(
            profile = report.profile_actions,
            content = report.content_actions,
            resolved = report.resolved_comments,
            "flush complete"
        );
        Ok(FlushOutcome::Flushed(report))
    }

    async fn send(
        &self,
        batch: &[PendingAction],
        credentials: &Credentials,
        temp_ids: &TempIdResolver,
    ) -> Result<(FlushReport, ContentReceipt), SyncError> {
        let (profile, content) = partition(batch, temp_ids);
        let report = FlushReport {
            profile_actions: profile.len(),
            content_actions: content.len(),
            resolved_comments: 0,
        };

        if !profile.is_empty() {
            let body = ProfileBatch {
                actions: profile,
                user_id: credentials.user_id.clone(),
            };
            self.transport
                .send_profile_actions(&body, &credentials.token)
                .await
                .map_err(|source| SyncError::Transport {
                    destination: Destination::Profile,
                    source,
                })?;
        }

        let mut receipt = ContentReceipt::default();
        if !content.is_empty() {
            let body = ContentBatch {
                actions: content,
                user_id: credentials.user_id.clone(),
            };
            receipt = self
                .transport
                .send_content_actions(&body, &credentials.token)
                .await
                .map_err(|source| SyncError::Transport {
                    destination: Destination::Content,
                    source,
                })?;
        }

        Ok((report, receipt))
    }

    /// Unfreeze the batch after a failure and report it.
    async fn abort(scope: &FlushScope<'_>, destination: Option<Destination>, err: SyncError) -> SyncError {
        let (cancelled, persisted) = scope.queue.abort_flight().await;
        for action in &cancelled {
            if let Action::AddComment { comment_id, .. } = &action.action {
                scope.temp_ids.forget(comment_id);
            }
        }
        if let Err(e) = persisted {
            tracing::error!("actions cancelled after the failed flush were not persisted: {e}");
        }
        scope.state.set_pending(scope.queue.len());
        Self::report_failure(scope, destination, err)
    }

    fn report_failure(scope: &FlushScope<'_>, destination: Option<Destination>, err: SyncError) -> SyncError {
        tracing::error!("flush failed: {err}");
        scope.state.fail(err.to_string());
        scope.events.notify(SyncEvent::FlushFailed {
            destination,
            error: err.to_string(),
        });
        err
    }
}

/// Split a batch into wire actions per destination, keeping queue order
/// within each group. Comment ids already confirmed by the backend are
/// substituted for their placeholders.
pub fn partition(batch: &[PendingAction], temp_ids: &TempIdResolver) -> (Vec<ProfileAction>, Vec<ContentAction>) {
    let mut profile = Vec::new();
    let mut content = Vec::new();
    for pending in batch {
        match pending.destination() {
            Destination::Profile => profile.extend(ProfileAction::from_pending(pending)),
            Destination::Content => {
                if let Some(mut action) = ContentAction::from_pending(pending) {
                    if let Some(ContentPayload::RemoveComment { comment_id }) = &mut action.payload {
                        *comment_id = temp_ids.canonical(comment_id);
                    }
                    content.push(action);
                }
            }
        }
    }
    (profile, content)
}
