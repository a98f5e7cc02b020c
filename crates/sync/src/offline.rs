//! Connectivity state as reported by the host platform.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Network reachable.
    Online,
    /// Network unreachable.
    Offline,
}

/// Holds the latest connectivity report and lets the sync worker react to
/// transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == ConnectivityState::Offline
    }

    pub fn set_online(&self) -> bool {
        self.set(ConnectivityState::Online)
    }

    pub fn set_offline(&self) -> bool {
        self.set(ConnectivityState::Offline)
    }

    /// Returns whether the state changed. Repeated reports are not broadcast.
    pub fn set(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(?state, "connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transitions_are_broadcast() {
        let monitor = ConnectivityMonitor::default();
        let mut rx = monitor.subscribe();

        assert!(!monitor.set_online());
        assert!(!rx.has_changed().unwrap());

        assert!(monitor.set_offline());
        assert!(monitor.is_offline());
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Offline);

        assert!(monitor.set_online());
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Online);
    }
}
