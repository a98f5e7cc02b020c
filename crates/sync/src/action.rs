//! Queued user intents.

use chrono::{DateTime, Utc};
use crinz_core::{ActionId, CommentId, ContentId, UserId};
use serde::{Deserialize, Serialize};

/// What the user asked for, with the data that kind of request needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Action {
    Like,
    Unlike,
    AddComment {
        /// Client-generated placeholder until the backend assigns an id.
        #[serde(rename = "commentId")]
        comment_id: CommentId,
        text: String,
        #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<CommentId>,
    },
    RemoveComment {
        #[serde(rename = "commentId")]
        comment_id: CommentId,
    },
    UpdatePost {
        message: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    DeletePost,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Like => ActionKind::Like,
            Action::Unlike => ActionKind::Unlike,
            Action::AddComment { .. } => ActionKind::AddComment,
            Action::RemoveComment { .. } => ActionKind::RemoveComment,
            Action::UpdatePost { .. } => ActionKind::UpdatePost,
            Action::DeletePost => ActionKind::DeletePost,
        }
    }
}

/// Payload-free discriminant of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Like,
    Unlike,
    AddComment,
    RemoveComment,
    UpdatePost,
    DeletePost,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Like => "like",
            ActionKind::Unlike => "unlike",
            ActionKind::AddComment => "add_comment",
            ActionKind::RemoveComment => "remove_comment",
            ActionKind::UpdatePost => "update_post",
            ActionKind::DeletePost => "delete_post",
        }
    }

    /// Backend surface that accepts this kind.
    pub fn destination(&self) -> Destination {
        match self {
            ActionKind::UpdatePost | ActionKind::DeletePost => Destination::Profile,
            ActionKind::Like
            | ActionKind::Unlike
            | ActionKind::AddComment
            | ActionKind::RemoveComment => Destination::Content,
        }
    }

    /// `like`/`unlike`: at most one per (target, actor) may be queued.
    pub fn is_reaction(&self) -> bool {
        matches!(self, ActionKind::Like | ActionKind::Unlike)
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two independent backend surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Post edits and deletions.
    Profile,
    /// Likes and comments.
    Content,
}

impl core::fmt::Display for Destination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Destination::Profile => f.write_str("profile"),
            Destination::Content => f.write_str("content"),
        }
    }
}

/// One queued intent, as persisted in the durable queue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: ActionId,
    pub target_id: ContentId,
    pub actor_id: UserId,
    pub action: Action,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(target_id: ContentId, actor_id: UserId, action: Action) -> Self {
        Self {
            id: ActionId::new(),
            target_id,
            actor_id,
            action,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_enqueued_at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn destination(&self) -> Destination {
        self.kind().destination()
    }

    /// Same target and same actor.
    pub fn same_subject(&self, other: &PendingAction) -> bool {
        self.target_id == other.target_id && self.actor_id == other.actor_id
    }
}
