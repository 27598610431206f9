//! Component storages.
//!
//! Every component type gets one storage cell in the `World`,
//! created the first time the type is used. A cell is shared
//! through an `Arc` so that parallel jobs can hold onto it for
//! the duration of a phase without borrowing the `World`.

mod shared;
mod single;
mod sparse;

pub use shared::SharedStorage;
pub use single::StaticStorage;
pub use sparse::SparseSet;

use crate::borrow::{AtomicRef, AtomicRefCell, AtomicRefMut};
use crate::component::{Component, ComponentId, StorageKind};
use crate::entity::Entity;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased interface over the three storage kinds, used
/// where the `World` handles components it cannot name.
pub(crate) trait Storage: Any + Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Whether `entity` holds this component. For shared
    /// storages this tests ownership; static storages hold
    /// no per-entity data.
    fn contains(&self, entity: Entity) -> bool;

    /// Detaches `entity` from this storage, dropping its
    /// value if it has one. Returns whether anything was removed.
    fn remove_entity(&mut self, entity: Entity) -> bool;

    /// Number of entities holding this component.
    fn len(&self) -> usize;

    /// The entities holding this component.
    fn holders(&self) -> Vec<Entity>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) type StorageCell = Arc<AtomicRefCell<Box<dyn Storage>>>;

pub(crate) fn new_cell<S: Storage>(storage: S) -> StorageCell {
    Arc::new(AtomicRefCell::new(Box::new(storage)))
}

fn downcast_ref<S: Storage>(storage: &dyn Storage) -> &S {
    storage.as_any().downcast_ref().unwrap_or_else(|| {
        panic!(
            "storage is not a {}; component ids are out of sync",
            std::any::type_name::<S>()
        )
    })
}

fn downcast_mut<S: Storage>(storage: &mut dyn Storage) -> &mut S {
    storage.as_any_mut().downcast_mut().unwrap_or_else(|| {
        panic!(
            "storage is not a {}; component ids are out of sync",
            std::any::type_name::<S>()
        )
    })
}

/// Immutably borrows the typed storage behind a cell.
pub(crate) fn borrow<S: Storage>(cell: &StorageCell) -> AtomicRef<'_, S> {
    AtomicRef::map(cell.borrow(), |storage| downcast_ref::<S>(&**storage))
}

/// Mutably borrows the typed storage behind a cell.
pub(crate) fn borrow_mut<S: Storage>(cell: &StorageCell) -> AtomicRefMut<'_, S> {
    AtomicRefMut::map(cell.borrow_mut(), |storage| downcast_mut::<S>(&mut **storage))
}

/// A handle onto the per-entity storage of component `T`.
///
/// Columns are cheap to clone and may be moved into jobs. They
/// keep the storage alive but do not keep it borrowed; borrowing
/// is checked at runtime, so a job that borrows a column mutably
/// excludes every other access to the same component type until
/// it finishes.
pub struct Column<T> {
    cell: StorageCell,
    id: ComponentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Column<T> {
    pub(crate) fn new(cell: StorageCell, id: ComponentId) -> Self {
        Self {
            cell,
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the id of the component type stored in this column.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Immutably borrows the storage.
    ///
    /// # Panics
    /// Panics if the storage is mutably borrowed.
    pub fn borrow(&self) -> AtomicRef<'_, SparseSet<T>> {
        borrow(&self.cell)
    }

    /// Mutably borrows the storage.
    ///
    /// # Panics
    /// Panics if the storage is borrowed.
    pub fn borrow_mut(&self) -> AtomicRefMut<'_, SparseSet<T>> {
        borrow_mut(&self.cell)
    }
}

impl<T> Clone for Column<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            id: self.id,
            _marker: PhantomData,
        }
    }
}
