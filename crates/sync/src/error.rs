//! Error types for the sync engine.

use crinz_core::DomainError;

use crate::action::Destination;

/// Failure of the local key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Failure of one batch request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
}

/// Error surfaced by the engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The queued snapshot is larger than the backend accepts in one write.
    #[error("batch of {size} actions exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// No credential is available; the caller should re-authenticate.
    #[error("not signed in; cannot sync pending actions")]
    Unauthenticated,

    /// A batch request failed. Nothing was removed from the queue.
    #[error("{destination} batch failed: {source}")]
    Transport {
        destination: Destination,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Whether the failure was detected before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SyncError::BatchTooLarge { .. } | SyncError::Unauthenticated | SyncError::Domain(_)
        )
    }
}
