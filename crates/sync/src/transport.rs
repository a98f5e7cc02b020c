//! Batch requests to the profile and content endpoints.

use async_trait::async_trait;
use crinz_core::{CommentId, UserId};
use serde::{Deserialize, Serialize};

use crate::action::{Action, PendingAction};
use crate::config::SyncConfig;
use crate::error::TransportError;

/// Request body of the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBatch {
    pub actions: Vec<ProfileAction>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAction {
    #[serde(rename = "type")]
    pub kind: ProfileActionType,
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PostData>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileActionType {
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostData {
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body of the content endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBatch {
    pub actions: Vec<ContentAction>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAction {
    #[serde(rename = "type")]
    pub kind: ContentActionType,
    pub crinz_id: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ContentPayload>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentActionType {
    Like,
    Unlike,
    AddComment,
    RemoveComment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPayload {
    #[serde(rename_all = "camelCase")]
    AddComment {
        comment_id: CommentId,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<CommentId>,
    },
    #[serde(rename_all = "camelCase")]
    RemoveComment { comment_id: CommentId },
}

/// Optional success body of the content endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReceipt {
    #[serde(default)]
    pub created_comments: Vec<CreatedComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedComment {
    pub temp_id: CommentId,
    pub comment_id: CommentId,
}

impl ProfileAction {
    /// Wire form of a queued post edit or deletion; `None` for other kinds.
    pub fn from_pending(pending: &PendingAction) -> Option<Self> {
        let (kind, data) = match &pending.action {
            Action::UpdatePost { message, tags } => (
                ProfileActionType::Update,
                Some(PostData {
                    message: message.clone(),
                    tags: tags.clone(),
                }),
            ),
            Action::DeletePost => (ProfileActionType::Delete, None),
            _ => return None,
        };
        Some(Self {
            kind,
            post_id: pending.target_id.to_string(),
            data,
            idempotency_key: pending.id.to_string(),
        })
    }
}

impl ContentAction {
    /// Wire form of a queued reaction or comment change; `None` for other
    /// kinds.
    pub fn from_pending(pending: &PendingAction) -> Option<Self> {
        let (kind, payload) = match &pending.action {
            Action::Like => (ContentActionType::Like, None),
            Action::Unlike => (ContentActionType::Unlike, None),
            Action::AddComment {
                comment_id,
                text,
                parent_id,
            } => (
                ContentActionType::AddComment,
                Some(ContentPayload::AddComment {
                    comment_id: comment_id.clone(),
                    text: text.clone(),
                    parent_id: parent_id.clone(),
                }),
            ),
            Action::RemoveComment { comment_id } => (
                ContentActionType::RemoveComment,
                Some(ContentPayload::RemoveComment {
                    comment_id: comment_id.clone(),
                }),
            ),
            Action::UpdatePost { .. } | Action::DeletePost => return None,
        };
        Some(Self {
            kind,
            crinz_id: pending.target_id.to_string(),
            user_id: pending.actor_id.clone(),
            payload,
            idempotency_key: pending.id.to_string(),
        })
    }
}

/// Sends one batch per call. Implementations must treat any non-2xx response
/// as failure of the whole batch.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn send_profile_actions(&self, batch: &ProfileBatch, token: &str) -> Result<(), TransportError>;

    async fn send_content_actions(
        &self,
        batch: &ContentBatch,
        token: &str,
    ) -> Result<ContentReceipt, TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    profile_url: String,
    content_url: String,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            profile_url: config.profile_actions_url(),
            content_url: config.content_actions_url(),
        }
    }

    async fn post<B: Serialize + Sync>(&self, url: &str, body: &B, token: &str) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Api(
                status.as_u16(),
                resp.text().await.unwrap_or_default(),
            ));
        }

        // The status already confirmed delivery; an unreadable body is not a
        // batch failure.
        Ok(resp.text().await.unwrap_or_default())
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn send_profile_actions(&self, batch: &ProfileBatch, token: &str) -> Result<(), TransportError> {
        self.post(&self.profile_url, batch, token).await?;
        Ok(())
    }

    async fn send_content_actions(
        &self,
        batch: &ContentBatch,
        token: &str,
    ) -> Result<ContentReceipt, TransportError> {
        let body = self.post(&self.content_url, batch, token).await?;
        Ok(parse_receipt(&body))
    }
}

/// Lenient parse of the content endpoint's success body.
pub fn parse_receipt(body: &str) -> ContentReceipt {
    if body.trim().is_empty() {
        return ContentReceipt::default();
    }
    match serde_json::from_str::<ContentReceipt>(body) {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::warn!("ignoring unreadable content batch response: {e}");
            ContentReceipt::default()
        }
    }
}
