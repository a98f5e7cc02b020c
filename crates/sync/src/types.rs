//! Shared value types: counters, server snapshots and engine events.

use chrono::{DateTime, Utc};
use crinz_core::CommentId;
use serde::{Deserialize, Deserializer, Serialize};

use crate::action::Destination;

/// Optimistic engagement counters of one content item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub view_count: u64,
    /// The acting user's latest intent, not necessarily acknowledged.
    pub is_liked_by_user: bool,
}

impl ContentStats {
    /// Apply a relative change. Counters clamp at zero.
    pub fn apply(&mut self, delta: &StatsDelta) {
        self.like_count = shift(self.like_count, delta.like_count);
        self.comment_count = shift(self.comment_count, delta.comment_count);
        self.share_count = shift(self.share_count, delta.share_count);
        self.view_count = shift(self.view_count, delta.view_count);
        if let Some(liked) = delta.is_liked_by_user {
            self.is_liked_by_user = liked;
        }
    }
}

fn shift(count: u64, delta: i64) -> u64 {
    if delta < 0 {
        count.saturating_sub(delta.unsigned_abs())
    } else {
        count.saturating_add(delta as u64)
    }
}

/// Relative change to [`ContentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub view_count: i64,
    pub is_liked_by_user: Option<bool>,
}

impl StatsDelta {
    pub fn like() -> Self {
        Self {
            like_count: 1,
            is_liked_by_user: Some(true),
            ..Self::default()
        }
    }

    pub fn unlike() -> Self {
        Self {
            like_count: -1,
            is_liked_by_user: Some(false),
            ..Self::default()
        }
    }

    pub fn comments(by: i64) -> Self {
        Self {
            comment_count: by,
            ..Self::default()
        }
    }

    pub fn shares(by: i64) -> Self {
        Self {
            share_count: by,
            ..Self::default()
        }
    }

    pub fn views(by: i64) -> Self {
        Self {
            view_count: by,
            ..Self::default()
        }
    }
}

/// Authoritative counters as returned by the backend.
///
/// Two naming conventions are in circulation (`likeCount` and `likes`, ...).
/// Either is accepted, and a list in place of a count is counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    #[serde(default, alias = "likes", deserialize_with = "count_or_list")]
    pub like_count: Option<u64>,
    #[serde(default, alias = "comments", deserialize_with = "count_or_list")]
    pub comment_count: Option<u64>,
    #[serde(default, alias = "shares", deserialize_with = "count_or_list")]
    pub share_count: Option<u64>,
    #[serde(default, alias = "views", deserialize_with = "count_or_list")]
    pub view_count: Option<u64>,
    #[serde(default, alias = "isLiked")]
    pub is_liked_by_user: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountField {
    Count(u64),
    List(Vec<serde_json::Value>),
    Missing(()),
}

fn count_or_list<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match CountField::deserialize(deserializer)? {
        CountField::Count(n) => Some(n),
        CountField::List(items) => Some(items.len() as u64),
        CountField::Missing(()) => None,
    })
}

/// Engine-wide notifications, published on the engine's event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A flush completed and removed `actions` entries from the queue.
    FlushSucceeded {
        actions: usize,
        at: DateTime<Utc>,
    },
    /// A flush failed; the queue is unchanged.
    FlushFailed {
        destination: Option<Destination>,
        error: String,
    },
    /// A comment created on the client now has its backend id.
    CommentResolved {
        temporary: CommentId,
        confirmed: CommentId,
    },
}
