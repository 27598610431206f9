use super::Storage;
use crate::component::{Component, StorageKind};
use crate::entity::Entity;
use std::any::Any;

/// Storage for a component with exactly one, entity-less instance.
///
/// The slot starts empty; it is filled by `replace` or on first
/// access through `World::static_or_default`.
#[derive(Debug)]
pub struct StaticStorage<T> {
    value: Option<T>,
}

impl<T> Default for StaticStorage<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> StaticStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Stores `value`, returning the previous instance.
    pub fn replace(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    pub fn get_or_insert_with(&mut self, f: impl FnOnce() -> T) -> &mut T {
        self.value.get_or_insert_with(f)
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Component> Storage for StaticStorage<T> {
    fn kind(&self) -> StorageKind {
        StorageKind::Static
    }

    fn contains(&self, _entity: Entity) -> bool {
        false
    }

    fn remove_entity(&mut self, _entity: Entity) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }

    fn holders(&self) -> Vec<Entity> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
