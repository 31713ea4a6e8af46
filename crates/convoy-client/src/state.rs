use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::Connection;
use crate::registry::Registry;

/// Shared registry + connection bundle for one connection's lifetime.
///
/// Owned by the facade; entities and handlers hold it weakly so the registry
/// never keeps itself alive through its own entries.
#[derive(Default)]
pub struct SyncContext {
    pub connection: Connection,
    registry: Mutex<Registry>,
}

impl SyncContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Locks the registry. Never call while holding an entity's state lock.
    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
