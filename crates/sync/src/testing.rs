//! Scripted transport and store for engine and dispatcher tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crinz_core::CommentId;
use tokio::sync::Notify;

use crate::action::Destination;
use crate::error::{StoreError, TransportError};
use crate::kv_store::{InMemoryKvStore, KvStore};
use crate::transport::{
    ActionTransport, ContentBatch, ContentPayload, ContentReceipt, CreatedComment, ProfileBatch,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordedCall {
    Profile(ProfileBatch),
    Content(ContentBatch),
}

impl RecordedCall {
    pub(crate) fn destination(&self) -> Destination {
        match self {
            RecordedCall::Profile(_) => Destination::Profile,
            RecordedCall::Content(_) => Destination::Content,
        }
    }
}

/// Records every batch and answers from a script.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<Destination, VecDeque<TransportError>>>,
    created: Mutex<HashMap<CommentId, CommentId>>,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn destinations(&self) -> Vec<Destination> {
        self.calls().iter().map(RecordedCall::destination).collect()
    }

    /// The next request to `destination` fails with `error`.
    pub(crate) fn fail_next(&self, destination: Destination, error: TransportError) {
        self.failures
            .lock()
            .unwrap()
            .entry(destination)
            .or_default()
            .push_back(error);
    }

    /// Answer an `add_comment` for `temporary` with `confirmed`.
    pub(crate) fn resolve_comment(&self, temporary: CommentId, confirmed: CommentId) {
        self.created.lock().unwrap().insert(temporary, confirmed);
    }

    /// Requests block until the returned gate is notified.
    pub(crate) fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Notified each time a request reaches the transport.
    pub(crate) fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }

    async fn answer(&self, call: RecordedCall) -> Result<(), TransportError> {
        let destination = call.destination();
        self.calls.lock().unwrap().push(call);
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&destination)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ActionTransport for RecordingTransport {
    async fn send_profile_actions(&self, batch: &ProfileBatch, _token: &str) -> Result<(), TransportError> {
        self.answer(RecordedCall::Profile(batch.clone())).await
    }

    async fn send_content_actions(
        &self,
        batch: &ContentBatch,
        _token: &str,
    ) -> Result<ContentReceipt, TransportError> {
        self.answer(RecordedCall::Content(batch.clone())).await?;

        let created = self.created.lock().unwrap();
        let created_comments = batch
            .actions
            .iter()
            .filter_map(|action| match &action.payload {
                Some(ContentPayload::AddComment { comment_id, .. }) => {
                    created.get(comment_id).map(|confirmed| CreatedComment {
                        temp_id: comment_id.clone(),
                        comment_id: confirmed.clone(),
                    })
                }
                _ => None,
            })
            .collect();
        Ok(ContentReceipt { created_comments })
    }
}

/// In-memory store whose writes can be made to fail. Reads always succeed.
#[derive(Debug, Default)]
pub(crate) struct FlakyKvStore {
    inner: InMemoryKvStore,
    failing: AtomicBool,
}

impl FlakyKvStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }
}
