//! Process-local fan-out of engine notifications.
//!
//! The sync engine announces flush results and resolved comment ids here.
//! Observers are usually UI glue that polls its [`Subscription`] between
//! frames, so delivery never blocks the publisher: each observer owns an
//! unbounded channel and a closed one is simply dropped from the list.

use std::sync::{Mutex, MutexGuard, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryBusError {
    #[error("observer list lock poisoned")]
    Poisoned,
}

/// Broadcast bus for notifications that only live as long as the process.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    observers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observers registered and not yet found closed.
    pub fn subscriber_count(&self) -> usize {
        self.observers().map_or(0, |observers| observers.len())
    }

    fn observers(&self) -> Result<MutexGuard<'_, Vec<mpsc::Sender<M>>>, InMemoryBusError> {
        self.observers.lock().map_err(|_| InMemoryBusError::Poisoned)
    }
}

impl<M: Clone + Send + 'static> InMemoryEventBus<M> {
    /// Publish without failing the caller. Returns how many observers
    /// received the message; a broken bus is logged and counts as none.
    pub fn notify(&self, message: M) -> usize {
        match self.fan_out(message) {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::warn!("notification dropped: {e}");
                0
            }
        }
    }

    fn fan_out(&self, message: M) -> Result<usize, InMemoryBusError> {
        let mut observers = self.observers()?;
        observers.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(observers.len())
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        self.fan_out(message).map(|_| ())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        match self.observers() {
            Ok(mut observers) => observers.push(tx),
            Err(e) => tracing::warn!("subscription will never receive notifications: {e}"),
        }
        Subscription::new(rx)
    }
}
