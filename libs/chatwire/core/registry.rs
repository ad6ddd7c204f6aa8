//! Topic-keyed listener bookkeeping
//!
//! A [`ListenerRegistry`] maps routing keys to callback lists. Dispatch
//! iterates over a snapshot of the list taken at dispatch time, so a callback
//! may unsubscribe itself or any other listener mid-dispatch without
//! corrupting the iteration; a notification already snapshotted may still
//! fire after its unsubscribe returns.

use crate::core::event::{ConversationId, ServerEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Routing key for inbound event delivery
///
/// `None` in the conversation-scoped variants addresses the global
/// subscribers for that event class; `Some(id)` addresses one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Messages,
    Typing(Option<ConversationId>),
    ReadStatus(Option<ConversationId>),
    Group(Option<ConversationId>),
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct RegistryInner<K, E: ?Sized> {
    listeners: RwLock<HashMap<K, Vec<(u64, Callback<E>)>>>,
    next_id: AtomicU64,
}

/// Typed subscribe/unsubscribe bookkeeping for event delivery
///
/// Subscribe and unsubscribe are O(1) amortized (a hash lookup plus a
/// vector scan bounded by the listeners on one key). Listener callbacks run
/// synchronously on the dispatching thread, in registration order; a
/// panicking callback is caught and logged and does not affect the others.
pub struct ListenerRegistry<K, E>
where
    K: Hash + Eq + Clone,
{
    inner: Arc<RegistryInner<K, E>>,
}

impl<K, E> Default for ListenerRegistry<K, E>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> ListenerRegistry<K, E>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a callback for a key
    ///
    /// The returned handle is the only way to remove the listener. Dropping
    /// it without calling [`Subscription::unsubscribe`] leaks the listener;
    /// that is the caller's responsibility.
    pub fn subscribe(
        &self,
        key: K,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription<K, E> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            inner: Arc::clone(&self.inner),
            key,
            id,
        }
    }

    /// Invoke every listener registered for `key`, in registration order
    ///
    /// Returns the number of listeners notified.
    pub fn dispatch(&self, key: &K, event: &E) -> usize {
        // Snapshot before invoking so callbacks can mutate the table.
        let snapshot: Vec<Callback<E>> = {
            let listeners = self.inner.listeners.read();
            match listeners.get(key) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };

        for callback in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!("listener panicked during dispatch; continuing");
            }
        }

        snapshot.len()
    }

    /// Number of listeners currently registered for `key`
    pub fn listener_count(&self, key: &K) -> usize {
        self.inner
            .listeners
            .read()
            .get(key)
            .map_or(0, |entries| entries.len())
    }
}

// Clone shares the same listener table.
impl<K, E> Clone for ListenerRegistry<K, E>
where
    K: Hash + Eq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`]
///
/// Removal is explicit: call [`Subscription::unsubscribe`]. Unsubscribing
/// prevents future dispatches but does not recall a dispatch that has
/// already snapshotted the listener.
pub struct Subscription<K, E>
where
    K: Hash + Eq + Clone,
{
    inner: Arc<RegistryInner<K, E>>,
    key: K,
    id: u64,
}

impl<K, E> Subscription<K, E>
where
    K: Hash + Eq + Clone,
{
    pub fn unsubscribe(self) {
        let mut listeners = self.inner.listeners.write();
        if let Some(entries) = listeners.get_mut(&self.key) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                listeners.remove(&self.key);
            }
        }
    }
}

/// Registry keyed by inbound event topics
pub type EventRegistry = ListenerRegistry<Topic, ServerEvent>;
/// Subscription to an inbound event topic
pub type EventSubscription = Subscription<Topic, ServerEvent>;
