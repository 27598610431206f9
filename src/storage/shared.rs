use super::Storage;
use crate::component::{Component, StorageKind};
use crate::entity::Entity;
use crate::util::HashSet;
use parking_lot::RwLock;
use std::any::Any;

/// Storage for a component with one instance referenced by
/// a dynamic set of owning entities.
///
/// The owner set sits behind its own lock so that ownership can be
/// tested from many parallel readers through a shared borrow of
/// the storage, while the value itself follows the borrow rules of
/// the storage cell.
#[derive(Debug)]
pub struct SharedStorage<T> {
    value: Option<T>,
    owners: RwLock<HashSet<Entity>>,
}

impl<T> Default for SharedStorage<T> {
    fn default() -> Self {
        Self {
            value: None,
            owners: RwLock::new(HashSet::default()),
        }
    }
}

impl<T> SharedStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Sets the shared instance, returning the previous one.
    /// Owners are left untouched.
    pub fn set(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    /// Returns `true` if `entity` was not already an owner.
    pub fn add_owner(&self, entity: Entity) -> bool {
        self.owners.write().insert(entity)
    }

    /// Returns `true` if `entity` was an owner.
    pub fn remove_owner(&self, entity: Entity) -> bool {
        self.owners.write().remove(&entity)
    }

    pub fn is_owner(&self, entity: Entity) -> bool {
        self.owners.read().contains(&entity)
    }

    /// Snapshot of the current owners, in no particular order.
    pub fn owners(&self) -> Vec<Entity> {
        self.owners.read().iter().copied().collect()
    }

    pub fn owner_count(&self) -> usize {
        self.owners.read().len()
    }
}

impl<T: Component> Storage for SharedStorage<T> {
    fn kind(&self) -> StorageKind {
        StorageKind::Shared
    }

    fn contains(&self, entity: Entity) -> bool {
        self.is_owner(entity)
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.owners.get_mut().remove(&entity)
    }

    fn len(&self) -> usize {
        self.owner_count()
    }

    fn holders(&self) -> Vec<Entity> {
        self.owners()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
