use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use convoy_core::{EntityKind, Path};

use crate::entity::Entity;
use crate::error::RegistryError;

/// Path-keyed directory of live entities plus the FIFO of local creates
/// still waiting for a server-assigned identity.
#[derive(Default)]
pub struct Registry {
    entities: HashMap<Path, Arc<Entity>>,
    pending_creates: VecDeque<Arc<Entity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identified entity under its path.
    pub fn register(&mut self, entity: Arc<Entity>) -> Result<(), RegistryError> {
        let path = entity.path().ok_or(RegistryError::UnknownPath)?;
        if self.entities.contains_key(&path) {
            return Err(RegistryError::PathCollision(path.to_string()));
        }
        self.entities.insert(path, entity);
        Ok(())
    }

    pub fn unregister(&mut self, path: &Path) -> Option<Arc<Entity>> {
        self.entities.remove(path)
    }

    pub fn lookup(&self, path: &Path) -> Option<Arc<Entity>> {
        self.entities.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entities.contains_key(path)
    }

    /// Direct children of `parent`, optionally filtered by kind, ordered by path.
    pub fn children_of(&self, parent: &Path, kind: Option<EntityKind>) -> Vec<Arc<Entity>> {
        let mut children: Vec<(String, Arc<Entity>)> = self
            .entities
            .iter()
            .filter(|(path, _)| parent.is_parent_of(path))
            .filter(|(path, _)| kind.map_or(true, |k| path.kind() == k))
            .map(|(path, entity)| (path.to_string(), Arc::clone(entity)))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children.into_iter().map(|(_, entity)| entity).collect()
    }

    pub fn add_pending_create(&mut self, entity: Arc<Entity>) {
        self.pending_creates.push_back(entity);
    }

    /// Pops the oldest outstanding local create.
    ///
    /// `Created` acknowledgements carry no client correlation id, so they are
    /// matched purely by order. This relies on the server acknowledging
    /// creates in the order this connection issued them.
    pub fn take_oldest_pending_create(&mut self) -> Option<Arc<Entity>> {
        self.pending_creates.pop_front()
    }

    /// Puts back an entity taken by [`Self::take_oldest_pending_create`]
    /// that did not match the acknowledgement, keeping its position.
    pub fn restore_pending_create(&mut self, entity: Arc<Entity>) {
        self.pending_creates.push_front(entity);
    }

    pub fn pending_creates(&self) -> usize {
        self.pending_creates.len()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drops every entry, e.g. before re-seeding after a reconnect.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_creates.clear();
    }
}
