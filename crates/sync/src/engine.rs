//! The sync engine: the one object UI code talks to.
//!
//! Every user intent goes through here. The optimistic counter change is
//! applied and delivered to subscribers first, then the intent is admitted to
//! the durable queue, then the worker's debounce timer is re-armed.

use std::sync::{Arc, Mutex, Weak};

use anyhow::Context;
use async_trait::async_trait;
use crinz_core::{CommentId, ContentId, DomainError, UserId};
use crinz_events::{EventBus, InMemoryEventBus, Subscription};
use tokio::sync::watch;

use crate::action::{Action, PendingAction};
use crate::canceller::Admission;
use crate::config::SyncConfig;
use crate::credentials::CredentialProvider;
use crate::dispatcher::{BatchDispatcher, FlushOutcome, FlushScope};
use crate::error::{StoreError, SyncError};
use crate::expiring_cache::ExpiringCache;
use crate::kv_store::{KvStore, SqliteKvStore};
use crate::offline::{ConnectivityMonitor, ConnectivityState};
use crate::queue::PendingQueue;
use crate::queue_store::QueueStore;
use crate::state::{SyncSnapshot, SyncStateCell};
use crate::stats_cache::{StatsCache, StatsSubscription};
use crate::sync_worker::{AutoFlush, SyncWorker, Trigger};
use crate::temp_ids::TempIdResolver;
use crate::transport::{ActionTransport, HttpTransport};
use crate::types::{ContentStats, ServerStats, StatsDelta, SyncEvent};

struct EngineInner {
    credentials: Arc<dyn CredentialProvider>,
    queue: PendingQueue,
    dispatcher: BatchDispatcher,
    stats: StatsCache,
    temp_ids: TempIdResolver,
    state: SyncStateCell,
    events: InMemoryEventBus<SyncEvent>,
    connectivity: ConnectivityMonitor,
    cache: ExpiringCache,
}

impl EngineInner {
    async fn flush(&self) -> Result<FlushOutcome, SyncError> {
        let scope = FlushScope {
            queue: &self.queue,
            temp_ids: &self.temp_ids,
            stats: &self.stats,
            state: &self.state,
            events: &self.events,
        };
        self.dispatcher.flush(scope).await
    }
}

#[async_trait]
impl AutoFlush for EngineInner {
    fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    async fn auto_flush(&self, trigger: Trigger) {
        // Failures are already recorded in the sync state and on the bus.
        if let Err(e) = self.flush().await {
            tracing::debug!(?trigger, "automatic flush did not complete: {e}");
        }
    }
}

/// Builds a [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    credentials: Arc<dyn CredentialProvider>,
    store: Option<Arc<dyn KvStore>>,
    transport: Option<Arc<dyn ActionTransport>>,
    connectivity: ConnectivityState,
    auto_sync: bool,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config,
            credentials,
            store: None,
            transport: None,
            connectivity: ConnectivityState::Online,
            auto_sync: true,
        }
    }

    /// Local store for the queue and cache. Defaults to SQLite at
    /// [`SyncConfig::database_path`].
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`HttpTransport`] against the configured API.
    pub fn with_transport(mut self, transport: Arc<dyn ActionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_connectivity(mut self, state: ConnectivityState) -> Self {
        self.connectivity = state;
        self
    }

    /// Do not start the background worker; flushes happen only on
    /// [`SyncEngine::sync_now`].
    pub fn without_worker(mut self) -> Self {
        self.auto_sync = false;
        self
    }

    /// Restore the queue from the store and start the worker.
    ///
    /// Must be called within a tokio runtime.
    pub async fn init(self) -> anyhow::Result<SyncEngine> {
        let store: Arc<dyn KvStore> = match self.store {
            Some(store) => store,
            None => {
                let path = self
                    .config
                    .database_path()
                    .context("failed to resolve sync database path")?;
                tracing::info!("using sync database at {}", path.display());
                Arc::new(SqliteKvStore::new(path))
            }
        };
        let transport: Arc<dyn ActionTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)),
        };

        let queue = PendingQueue::restore(QueueStore::new(store.clone())).await;

        // Placeholders are not persisted separately; recover them from the
        // comments still waiting to be sent.
        let temp_ids = TempIdResolver::new();
        for pending in queue.snapshot() {
            if let Action::AddComment { comment_id, .. } = &pending.action {
                if comment_id.is_temporary() {
                    temp_ids.register(comment_id);
                }
            }
        }

        let pending = queue.len();
        let inner = Arc::new(EngineInner {
            dispatcher: BatchDispatcher::new(transport, self.credentials.clone(), self.config.max_batch_size),
            credentials: self.credentials,
            queue,
            stats: StatsCache::new(),
            temp_ids,
            state: SyncStateCell::new(pending),
            events: InMemoryEventBus::new(),
            connectivity: ConnectivityMonitor::new(self.connectivity),
            cache: ExpiringCache::new(store),
        });

        let worker = if self.auto_sync {
            let target: Weak<dyn AutoFlush> = Arc::downgrade(&inner) as Weak<dyn AutoFlush>;
            let worker = SyncWorker::start(target, self.config.debounce, inner.connectivity.subscribe());
            if pending > 0 {
                worker.kick();
            }
            Some(worker)
        } else {
            None
        };

        tracing::info!(pending, "sync engine initialized");
        Ok(SyncEngine {
            inner,
            worker: Mutex::new(worker),
        })
    }
}

/// Pending-action synchronization for one signed-in client.
///
/// Share it behind an `Arc`. Call [`SyncEngine::dispose`] on shutdown to stop
/// the background worker.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    worker: Mutex<Option<SyncWorker>>,
}

impl core::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("pending", &self.inner.queue.len())
            .field("state", &self.inner.state.current().status)
            .finish()
    }
}

impl SyncEngine {
    pub fn builder(config: SyncConfig, credentials: Arc<dyn CredentialProvider>) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config, credentials)
    }

    // -- enqueue operations --------------------------------------------------

    pub async fn like(&self, target: &ContentId) -> Result<Admission, SyncError> {
        let actor = self.actor()?;
        self.inner.stats.set_liked(target, true);
        self.enqueue(target, actor, Action::Like).await
    }

    pub async fn unlike(&self, target: &ContentId) -> Result<Admission, SyncError> {
        let actor = self.actor()?;
        self.inner.stats.set_liked(target, false);
        self.enqueue(target, actor, Action::Unlike).await
    }

    /// Like when not liked, unlike otherwise. Returns the new liked state.
    pub async fn toggle_like(&self, target: &ContentId) -> Result<bool, SyncError> {
        let liked = self
            .inner
            .stats
            .get(target)
            .is_some_and(|s| s.is_liked_by_user);
        if liked {
            self.unlike(target).await?;
        } else {
            self.like(target).await?;
        }
        Ok(!liked)
    }

    /// Queue a new comment and return its placeholder id.
    pub async fn add_comment(
        &self,
        target: &ContentId,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> Result<CommentId, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::validation("comment text must not be empty").into());
        }
        let actor = self.actor()?;

        let comment_id = CommentId::temporary();
        self.inner.temp_ids.register(&comment_id);
        self.inner.stats.update_stats(target, StatsDelta::comments(1));

        let action = Action::AddComment {
            comment_id: comment_id.clone(),
            text: text.to_string(),
            parent_id: parent_id.map(|p| self.inner.temp_ids.canonical(&p)),
        };
        self.enqueue(target, actor, action).await?;
        Ok(comment_id)
    }

    /// Queue removal of a comment. Removing a comment that was never sent
    /// cancels its creation instead.
    pub async fn remove_comment(&self, target: &ContentId, comment_id: &CommentId) -> Result<Admission, SyncError> {
        let actor = self.actor()?;
        let unsent = self.inner.temp_ids.is_pending(comment_id);
        let comment_id = if unsent {
            comment_id.clone()
        } else {
            self.inner.temp_ids.canonical(comment_id)
        };

        self.inner.stats.update_stats(target, StatsDelta::comments(-1));
        let (admission, persisted) = self
            .admit(
                target,
                actor,
                Action::RemoveComment {
                    comment_id: comment_id.clone(),
                },
            )
            .await;
        if let Admission::Cancelled(_) = admission {
            self.inner.temp_ids.forget(&comment_id);
        }
        persisted?;
        Ok(admission)
    }

    pub async fn update_post(
        &self,
        target: &ContentId,
        message: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Admission, SyncError> {
        let actor = self.actor()?;
        let action = Action::UpdatePost {
            message: message.into(),
            tags,
        };
        self.enqueue(target, actor, action).await
    }

    pub async fn delete_post(&self, target: &ContentId) -> Result<Admission, SyncError> {
        let actor = self.actor()?;
        self.enqueue(target, actor, Action::DeletePost).await
    }

    // -- stats ---------------------------------------------------------------

    pub fn stats(&self, content_id: &ContentId) -> Option<ContentStats> {
        self.inner.stats.get(content_id)
    }

    pub fn stats_cache(&self) -> &StatsCache {
        &self.inner.stats
    }

    pub fn initialize_stats(&self, content_id: &ContentId, server: ServerStats) -> ContentStats {
        self.inner.stats.initialize_stats(content_id, server)
    }

    pub fn subscribe_stats<F>(&self, content_id: &ContentId, callback: F) -> StatsSubscription
    where
        F: Fn(&ContentStats) + Send + Sync + 'static,
    {
        self.inner.stats.subscribe(content_id, callback)
    }

    pub fn watch_stats(&self, content_id: &ContentId) -> Subscription<ContentStats> {
        self.inner.stats.watch(content_id)
    }

    /// Forget an item that left the screen: its counters and the backend ids
    /// of comments created on it. Comments still queued keep their
    /// placeholders.
    pub fn evict(&self, content_id: &ContentId) -> Option<ContentStats> {
        let pruned = self.inner.temp_ids.prune(content_id);
        if pruned > 0 {
            tracing::debug!(%content_id, pruned, "dropped resolved comment ids");
        }
        self.inner.stats.evict(content_id)
    }

    // -- sync ----------------------------------------------------------------

    /// Flush now, regardless of connectivity reports or the debounce timer.
    pub async fn sync_now(&self) -> Result<FlushOutcome, SyncError> {
        self.inner.flush().await
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.inner.queue.snapshot()
    }

    pub fn state(&self) -> SyncSnapshot {
        self.inner.state.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.state.subscribe()
    }

    /// Engine-wide notifications (flush results, resolved comment ids).
    pub fn events(&self) -> Subscription<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Return from `success` to `idle` after the UI has shown it.
    pub fn acknowledge(&self) -> bool {
        self.inner.state.acknowledge()
    }

    pub fn set_online(&self) -> bool {
        self.inner.connectivity.set_online()
    }

    pub fn set_offline(&self) -> bool {
        self.inner.connectivity.set_offline()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.inner.connectivity.state()
    }

    /// Discard every queued action (e.g. on sign-out).
    pub async fn clear_queue(&self) -> Result<usize, StoreError> {
        let removed = self.inner.queue.clear().await?;
        self.inner.state.set_pending(0);
        tracing::info!(removed, "pending queue cleared");
        Ok(removed)
    }

    /// Backend id for a comment created on this client, once known.
    pub fn resolve_comment_id(&self, comment_id: &CommentId) -> CommentId {
        self.inner.temp_ids.canonical(comment_id)
    }

    /// Time-limited cache sharing the engine's local store.
    pub fn cache(&self) -> &ExpiringCache {
        &self.inner.cache
    }

    /// Stop the background worker. Queued actions stay in the store for the
    /// next session.
    pub async fn dispose(&self) {
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        tracing::info!(pending = self.inner.queue.len(), "sync engine disposed");
    }

    fn actor(&self) -> Result<UserId, SyncError> {
        self.inner
            .credentials
            .credentials()
            .map(|c| c.user_id)
            .ok_or(SyncError::Unauthenticated)
    }

    async fn enqueue(&self, target: &ContentId, actor: UserId, action: Action) -> Result<Admission, SyncError> {
        let (admission, persisted) = self.admit(target, actor, action).await;
        persisted?;
        Ok(admission)
    }

    /// The action stays queued in memory even when persisting it fails; the
    /// store error is returned alongside.
    async fn admit(&self, target: &ContentId, actor: UserId, action: Action) -> (Admission, Result<(), SyncError>) {
        let candidate = PendingAction::new(target.clone(), actor, action);
        let (admission, persisted) = self.inner.queue.admit(candidate).await;
        let persisted = persisted.map_err(|e| {
            tracing::error!("pending action kept in memory only: {e}");
            SyncError::Store(e)
        });

        self.inner.state.set_pending(self.inner.queue.len());
        if let Some(worker) = self.worker.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            worker.kick();
        }
        (admission, persisted)
    }
}
