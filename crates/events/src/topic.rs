//! Listeners keyed by topic.
//!
//! A [`Topics`] registry holds, per key, an ordered list of listeners. A
//! listener is either a callback or a channel ([`Subscription`]). Emitting to a
//! key invokes every listener registered for that key synchronously, so all of
//! them have seen the message by the time `emit` returns.
//!
//! Callbacks run outside the registry lock; a callback may register or remove
//! listeners without deadlocking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak, mpsc};

use crate::bus::Subscription;

/// Identifies one registered listener.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<M> = Arc<dyn Fn(&M) + Send + Sync>;

enum Listener<M> {
    Callback(Callback<M>),
    Channel(mpsc::Sender<M>),
}

impl<M> Clone for Listener<M> {
    fn clone(&self) -> Self {
        match self {
            Listener::Callback(f) => Listener::Callback(f.clone()),
            Listener::Channel(tx) => Listener::Channel(tx.clone()),
        }
    }
}

/// Registry of listeners grouped by key.
pub struct Topics<K, M> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<K, Vec<(ListenerId, Listener<M>)>>>,
}

impl<K, M> Default for Topics<K, M> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, M> core::fmt::Debug for Topics<K, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let topics = self.listeners.lock().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("Topics").field("topics", &topics).finish()
    }
}

impl<K, M> Topics<K, M>
where
    K: Eq + Hash + Clone + Send + 'static,
    M: Clone + Send + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a callback for `key`.
    ///
    /// The listener stays registered until the returned handle is dropped or
    /// [`ListenerHandle::unsubscribe`] is called.
    pub fn listen<F>(self: &Arc<Self>, key: K, callback: F) -> ListenerHandle<K, M>
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        let id = self.insert(key.clone(), Listener::Callback(Arc::new(callback)));
        ListenerHandle {
            topics: Arc::downgrade(self),
            key,
            id,
            active: true,
        }
    }

    /// Register a channel for `key`.
    ///
    /// Dropping the subscription unsubscribes it; the registry prunes the
    /// channel on the next emit for that key.
    pub fn watch(&self, key: K) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.insert(key, Listener::Channel(tx));
        Subscription::new(rx)
    }

    /// Remove exactly one listener. Returns whether it was registered.
    pub fn remove(&self, key: &K, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let Some(list) = listeners.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    /// Deliver `message` to every listener of `key`. Returns how many
    /// listeners received it.
    pub fn emit(&self, key: &K, message: &M) -> usize {
        let snapshot: Vec<(ListenerId, Listener<M>)> = match self.listeners.lock() {
            Ok(listeners) => listeners.get(key).cloned().unwrap_or_default(),
            Err(_) => {
                tracing::warn!("listener registry poisoned; dropping notification");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, listener) in snapshot {
            match listener {
                Listener::Callback(callback) => {
                    callback(message);
                    delivered += 1;
                }
                Listener::Channel(tx) => {
                    if tx.send(message.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        dead.push(id);
                    }
                }
            }
        }

        for id in dead {
            self.remove(key, id);
        }

        delivered
    }

    /// Number of listeners currently registered for `key`.
    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners
            .lock()
            .map(|l| l.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn insert(&self, key: K, listener: Listener<M>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entry(key).or_default().push((id, listener));
        }
        id
    }
}

/// Keeps a callback registered. Dropping the handle unregisters it.
pub struct ListenerHandle<K, M>
where
    K: Eq + Hash + Clone + Send + 'static,
    M: Clone + Send + 'static,
{
    topics: Weak<Topics<K, M>>,
    key: K,
    id: ListenerId,
    active: bool,
}

impl<K, M> ListenerHandle<K, M>
where
    K: Eq + Hash + Clone + Send + 'static,
    M: Clone + Send + 'static,
{
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unregister the callback now. Returns whether it was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.topics.upgrade() {
            Some(topics) => topics.remove(&self.key, self.id),
            None => false,
        }
    }
}

impl<K, M> Drop for ListenerHandle<K, M>
where
    K: Eq + Hash + Clone + Send + 'static,
    M: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.detach();
    }
}
