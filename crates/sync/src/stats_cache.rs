//! Optimistic engagement counters with per-item subscriptions.
//!
//! Every update is applied and delivered to all current subscribers of that
//! item before the call returns. Nothing here is persisted; counters are
//! rebuilt from server snapshots after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crinz_core::ContentId;
use crinz_events::{ListenerHandle, Subscription, Topics};

use crate::types::{ContentStats, ServerStats, StatsDelta};

/// Keeps a stats callback registered; dropping it unsubscribes.
pub type StatsSubscription = ListenerHandle<ContentId, ContentStats>;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    stats: ContentStats,
    /// `is_liked_by_user` was set by the user on this client and has not
    /// been confirmed by a successful flush yet.
    liked_locally: bool,
}

#[derive(Debug)]
pub struct StatsCache {
    entries: Mutex<HashMap<ContentId, Entry>>,
    topics: Arc<Topics<ContentId, ContentStats>>,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            topics: Topics::new(),
        }
    }
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, content_id: &ContentId) -> Option<ContentStats> {
        self.lock().get(content_id).map(|entry| entry.stats)
    }

    /// Apply a relative change (clamped at zero) and notify subscribers.
    pub fn update_stats(&self, content_id: &ContentId, delta: StatsDelta) -> ContentStats {
        let stats = {
            let mut entries = self.lock();
            let entry = entries.entry(content_id.clone()).or_default();
            entry.stats.apply(&delta);
            if delta.is_liked_by_user.is_some() {
                entry.liked_locally = true;
            }
            entry.stats
        };
        self.topics.emit(content_id, &stats);
        stats
    }

    /// Set the user's like intent. The like counter moves only when the
    /// intent actually changes, so repeated taps do not inflate it.
    pub fn set_liked(&self, content_id: &ContentId, liked: bool) -> ContentStats {
        let stats = {
            let mut entries = self.lock();
            let entry = entries.entry(content_id.clone()).or_default();
            if entry.stats.is_liked_by_user != liked {
                let delta = if liked {
                    StatsDelta::like()
                } else {
                    StatsDelta::unlike()
                };
                entry.stats.apply(&delta);
            }
            entry.liked_locally = true;
            entry.stats
        };
        self.topics.emit(content_id, &stats);
        stats
    }

    /// Merge authoritative counters from the backend.
    ///
    /// Counters present in the snapshot replace local values. The server's
    /// `is_liked_by_user` is ignored while a local like intent is unconfirmed.
    pub fn initialize_stats(&self, content_id: &ContentId, server: ServerStats) -> ContentStats {
        let stats = {
            let mut entries = self.lock();
            let entry = entries.entry(content_id.clone()).or_default();
            let stats = &mut entry.stats;
            if let Some(n) = server.like_count {
                stats.like_count = n;
            }
            if let Some(n) = server.comment_count {
                stats.comment_count = n;
            }
            if let Some(n) = server.share_count {
                stats.share_count = n;
            }
            if let Some(n) = server.view_count {
                stats.view_count = n;
            }
            if let Some(liked) = server.is_liked_by_user {
                if !entry.liked_locally {
                    stats.is_liked_by_user = liked;
                }
            }
            entry.stats
        };
        self.topics.emit(content_id, &stats);
        stats
    }

    /// Register `callback` for every future update of `content_id`.
    pub fn subscribe<F>(&self, content_id: &ContentId, callback: F) -> StatsSubscription
    where
        F: Fn(&ContentStats) + Send + Sync + 'static,
    {
        self.topics.listen(content_id.clone(), callback)
    }

    /// Channel-backed subscription for `content_id`.
    pub fn watch(&self, content_id: &ContentId) -> Subscription<ContentStats> {
        self.topics.watch(content_id.clone())
    }

    pub fn subscriber_count(&self, content_id: &ContentId) -> usize {
        self.topics.listener_count(content_id)
    }

    /// Mark local like intents as confirmed (after a successful flush).
    /// Subscribers are not notified; the visible values do not change.
    pub fn settle<'a>(&self, content_ids: impl IntoIterator<Item = &'a ContentId>) {
        let mut entries = self.lock();
        for id in content_ids {
            if let Some(entry) = entries.get_mut(id) {
                entry.liked_locally = false;
            }
        }
    }

    /// Forget the counters of an item that left the screen. Subscriptions are
    /// owned by their handles and are unaffected.
    pub fn evict(&self, content_id: &ContentId) -> Option<ContentStats> {
        self.lock().remove(content_id).map(|entry| entry.stats)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ContentId, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> ContentId {
        ContentId::parse(id).unwrap()
    }

    #[test]
    fn updates_reach_subscribers_before_returning() {
        let cache = StatsCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = cache.subscribe(&post("P1"), move |stats| {
            sink.lock().unwrap().push(stats.like_count)
        });

        cache.update_stats(&post("P1"), StatsDelta::like());
        cache.update_stats(&post("P2"), StatsDelta::like());

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn unsubscribing_removes_only_that_callback() {
        let cache = StatsCache::new();
        let first = cache.subscribe(&post("P1"), |_| {});
        let watch = cache.watch(&post("P1"));
        assert_eq!(cache.subscriber_count(&post("P1")), 2);

        assert!(first.unsubscribe());
        cache.update_stats(&post("P1"), StatsDelta::comments(1));

        assert_eq!(cache.subscriber_count(&post("P1")), 1);
        assert_eq!(watch.try_recv().unwrap().comment_count, 1);
    }

    #[test]
    fn decrements_clamp_at_zero() {
        let cache = StatsCache::new();
        for _ in 0..3 {
            cache.update_stats(&post("P1"), StatsDelta::unlike());
        }
        assert_eq!(cache.get(&post("P1")).unwrap().like_count, 0);
    }

    #[test]
    fn set_liked_is_idempotent() {
        let cache = StatsCache::new();
        cache.set_liked(&post("P1"), true);
        let stats = cache.set_liked(&post("P1"), true);
        assert_eq!(stats.like_count, 1);

        let stats = cache.set_liked(&post("P1"), false);
        assert_eq!(stats.like_count, 0);
        assert!(!stats.is_liked_by_user);
    }

    #[test]
    fn server_snapshot_keeps_unconfirmed_local_like() {
        let cache = StatsCache::new();
        cache.set_liked(&post("P1"), true);

        let stats = cache.initialize_stats(
            &post("P1"),
            ServerStats {
                like_count: Some(10),
                comment_count: Some(3),
                is_liked_by_user: Some(false),
                ..ServerStats::default()
            },
        );

        assert_eq!(stats.like_count, 10);
        assert_eq!(stats.comment_count, 3);
        assert!(stats.is_liked_by_user);
    }

    #[test]
    fn server_snapshot_wins_once_settled() {
        let cache = StatsCache::new();
        cache.set_liked(&post("P1"), true);
        cache.settle([&post("P1")]);

        let stats = cache.initialize_stats(
            &post("P1"),
            ServerStats {
                is_liked_by_user: Some(false),
                ..ServerStats::default()
            },
        );
        assert!(!stats.is_liked_by_user);
    }

    #[test]
    fn snapshot_without_counts_keeps_local_counts() {
        let cache = StatsCache::new();
        cache.update_stats(&post("P1"), StatsDelta::views(7));

        let stats = cache.initialize_stats(&post("P1"), ServerStats::default());
        assert_eq!(stats.view_count, 7);
    }

    #[test]
    fn evict_forgets_counters_but_not_subscribers() {
        let cache = StatsCache::new();
        let _sub = cache.subscribe(&post("P1"), |_| {});
        cache.update_stats(&post("P1"), StatsDelta::shares(2));

        assert_eq!(cache.evict(&post("P1")).unwrap().share_count, 2);
        assert!(cache.get(&post("P1")).is_none());
        assert_eq!(cache.subscriber_count(&post("P1")), 1);
    }
}
