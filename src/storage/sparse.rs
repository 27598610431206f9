use super::Storage;
use crate::component::{Component, StorageKind};
use crate::entity::Entity;
use std::any::Any;

/// Marks an entity index with no value in the set.
const EMPTY: u32 = u32::MAX;
/// Smallest sparse array allocated once the set first grows.
const MIN_SPARSE: usize = 64;

/// A component storage based on a sparse set.
///
/// `values` and `entities` are dense and parallel: the value at
/// slot `i` belongs to `entities[i]`. `sparse` is indexed directly
/// by entity index and maps to the slot, so its length tracks the
/// largest index stored rather than the number of values.
///
/// Removal swaps the last value into the freed slot, so the order
/// of the dense arrays is not stable.
#[derive(Debug)]
pub struct SparseSet<T> {
    sparse: Vec<u32>,
    entities: Vec<Entity>,
    values: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> SparseSet<T> {
    /// Creates a new, empty `SparseSet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with room for entity indices below `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sparse: vec![EMPTY; capacity],
            entities: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a value for `entity`, returning the value it replaced.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slot(entity) {
            return Some(std::mem::replace(&mut self.values[slot], value));
        }

        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.grow_sparse(index);
        }

        // An older generation of this index may still occupy the slot
        // if it was never removed; drop it so the new entity starts clean.
        if self.sparse[index] != EMPTY {
            let stale = self.entities[self.sparse[index] as usize];
            self.remove(stale);
        }

        self.sparse[index] = self.values.len() as u32;
        self.entities.push(entity);
        self.values.push(value);
        None
    }

    /// Removes the value of `entity`, moving the last value
    /// into its slot.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot(entity)?;
        let last = self.entities.len() - 1;

        self.sparse[entity.index() as usize] = EMPTY;
        if slot != last {
            let moved = self.entities[last];
            self.sparse[moved.index() as usize] = slot as u32;
        }

        self.entities.swap_remove(slot);
        Some(self.values.swap_remove(slot))
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|slot| &self.values[slot])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(move |slot| &mut self.values[slot])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    /// Returns the dense slot holding the value of `entity`.
    pub fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == EMPTY {
            return None;
        }

        let slot = slot as usize;
        if self.entities[slot] == entity {
            Some(slot)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The entities in dense order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The values in dense order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The values in dense order, mutably. Slices of this may be
    /// handed to parallel workers as long as they do not overlap.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Borrows entities and values together.
    pub fn split_mut(&mut self) -> (&[Entity], &mut [T]) {
        (&self.entities, &mut self.values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.entities.iter().copied().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> + '_ {
        self.entities.iter().copied().zip(self.values.iter_mut())
    }

    pub fn clear(&mut self) {
        for entity in self.entities.drain(..) {
            self.sparse[entity.index() as usize] = EMPTY;
        }
        self.values.clear();
    }

    fn grow_sparse(&mut self, index: usize) {
        let len = (self.sparse.len() * 2).max(index + 1).max(MIN_SPARSE);
        self.sparse.resize(len, EMPTY);
    }
}

impl<T: Component> Storage for SparseSet<T> {
    fn kind(&self) -> StorageKind {
        StorageKind::PerEntity
    }

    fn contains(&self, entity: Entity) -> bool {
        SparseSet::contains(self, entity)
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn len(&self) -> usize {
        SparseSet::len(self)
    }

    fn holders(&self) -> Vec<Entity> {
        self.entities.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
