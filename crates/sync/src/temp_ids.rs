//! Placeholder comment ids and their backend replacements.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crinz_core::{CommentId, ContentId};

#[derive(Debug, Default)]
struct Table {
    /// Placeholders whose `add_comment` has not been confirmed yet.
    pending: HashSet<CommentId>,
    /// Placeholder → (content item, backend id).
    resolved: HashMap<CommentId, (ContentId, CommentId)>,
}

/// Maps client-generated comment ids to the ids the backend assigned.
///
/// The table is transient. After a restart, placeholders still in the queue
/// are registered again from the restored queue.
#[derive(Debug, Default)]
pub struct TempIdResolver {
    table: Mutex<Table>,
}

impl TempIdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a placeholder created for a queued `add_comment`.
    pub fn register(&self, temporary: &CommentId) {
        self.lock().pending.insert(temporary.clone());
    }

    /// Stop tracking a placeholder whose `add_comment` was cancelled locally.
    pub fn forget(&self, temporary: &CommentId) -> bool {
        self.lock().pending.remove(temporary)
    }

    /// Record the backend id for a placeholder created on `target`.
    pub fn resolve(&self, target: &ContentId, temporary: CommentId, confirmed: CommentId) {
        let mut table = self.lock();
        table.pending.remove(&temporary);
        table.resolved.insert(temporary, (target.clone(), confirmed));
    }

    /// Backend id for `id`, if `id` is a resolved placeholder.
    pub fn lookup(&self, id: &CommentId) -> Option<CommentId> {
        self.lock().resolved.get(id).map(|(_, confirmed)| confirmed.clone())
    }

    /// The id to use when referring to `id` in a new request: the backend id
    /// when known, otherwise `id` itself.
    pub fn canonical(&self, id: &CommentId) -> CommentId {
        self.lookup(id).unwrap_or_else(|| id.clone())
    }

    pub fn is_pending(&self, id: &CommentId) -> bool {
        self.lock().pending.contains(id)
    }

    /// Drop the resolutions of comments on `target`. Returns how many were
    /// dropped.
    pub fn prune(&self, target: &ContentId) -> usize {
        let mut table = self.lock();
        let before = table.resolved.len();
        table.resolved.retain(|_, (content_id, _)| content_id != target);
        before - table.resolved.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
