use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use convoy_core::{EntityKind, Path};
use serde_json::Value;

use crate::route::Route;

/// Handle returned by [`Listeners::add`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registration list for callbacks observing events of type `E`.
///
/// `notify` runs callbacks against a snapshot of the list taken before the
/// first call, so a callback may add or remove listeners (including itself)
/// without deadlocking; such changes apply from the next notification.
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every registered callback in registration order and returns
    /// how many ran.
    pub fn notify(&self, event: &E) -> usize {
        let snapshot: Vec<Callback<E>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &snapshot {
            callback(event);
        }
        snapshot.len()
    }
}

/// Everything an entity listener can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    /// Server answered a read with the entity's current state.
    Connected,
    /// Server acknowledged creation.
    Created,
    /// Entity was deleted; terminal.
    Deleted,
    /// One or more attributes changed; names in schema order.
    Updated(Vec<String>),
    /// A single attribute changed to `value`.
    FieldChanged { field: String, value: Value },
    /// Server-supplied error message.
    Error(String),
    Subscribed,
    Unsubscribed,
    RouteSubscribed,
    RouteUnsubscribed,
    Routed(Route),
    /// A child became locally visible (cluster listeners only).
    ChildAdded { kind: EntityKind, path: Path },
    /// Parent-visible attributes of a child changed (cluster listeners only).
    ChildUpdated {
        kind: EntityKind,
        path: Path,
        fields: Vec<String>,
    },
    /// A child was deleted (cluster listeners only).
    ChildRemoved { kind: EntityKind, path: Path },
}
