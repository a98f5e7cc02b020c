//! `crinz-sync`
//!
//! **Responsibility:** pending-action synchronization for the Crinz feed client.
//!
//! This crate provides:
//! - Optimistic content counters with per-item subscriptions ([`stats_cache`])
//! - A durable queue of user intents with like/unlike and comment cancellation
//!   ([`canceller`], [`queue`], [`queue_store`])
//! - Bounded, single-flight batch dispatch to the profile and content
//!   endpoints ([`dispatcher`], [`transport`])
//! - Debounced and reconnect-triggered auto sync ([`sync_worker`], [`offline`])
//! - Temporary comment id reconciliation ([`temp_ids`])
//!
//! [`SyncEngine`] ties them together and is the only surface UI code talks to.

pub mod action;
pub mod canceller;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod expiring_cache;
pub mod kv_store;
pub mod offline;
pub mod queue;
pub mod queue_store;
pub mod state;
pub mod stats_cache;
pub mod sync_worker;
pub mod temp_ids;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionKind, Destination, PendingAction};
pub use canceller::{Admission, add_action, admit};
pub use config::SyncConfig;
pub use credentials::{CredentialProvider, Credentials, SessionCredentials};
pub use dispatcher::{BatchDispatcher, FlushOutcome, FlushReport, SkipReason};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{StoreError, SyncError, TransportError};
pub use expiring_cache::ExpiringCache;
pub use kv_store::{InMemoryKvStore, KvStore, SqliteKvStore};
pub use offline::{ConnectivityMonitor, ConnectivityState};
pub use state::{SyncSnapshot, SyncStatus};
pub use stats_cache::{StatsCache, StatsSubscription};
pub use temp_ids::TempIdResolver;
pub use transport::{ActionTransport, HttpTransport};
pub use types::{ContentStats, ServerStats, StatsDelta, SyncEvent};
