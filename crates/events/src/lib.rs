//! Observer primitives for the feed client.
//!
//! - [`bus`]: the `EventBus` contract and channel-backed `Subscription`.
//! - [`in_memory_bus`]: broadcast bus used for engine-wide events.
//! - [`topic`]: listeners keyed by topic (one content item, one listener list).

pub mod bus;
pub mod in_memory_bus;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use topic::{ListenerHandle, ListenerId, Topics};
