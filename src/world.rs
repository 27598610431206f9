mod allocator;

pub use allocator::EntityAllocator;

use crate::borrow::{AtomicRef, AtomicRefMut};
use crate::component::{Component, ComponentId, ComponentInfo, Components, StorageKind};
use crate::config::Config;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::events::{
    ComponentAdded, ComponentPreUpdated, ComponentRemoved, ComponentUpdated, EntityDisposed, Event,
    EventBus, SubscriptionId,
};
use crate::group::{Filter, FilterBuilder, GroupHandle, Groups};
use crate::job::JobSystem;
use crate::storage::{self, Column, SharedStorage, SparseSet, StaticStorage, Storage, StorageCell};
use crate::system::Scheduler;
use std::sync::Arc;

/// Contains entities, their components, and the groups and
/// systems operating on them.
///
/// A `World` is never copied. Parallel work reaches into it only
/// through `Column`s and `GroupHandle`s, which share the underlying
/// storages instead of duplicating them.
pub struct World {
    entities: EntityAllocator,
    components: Components,
    /// One cell per component id, created on first use.
    storages: Vec<Option<StorageCell>>,
    groups: Groups,
    events: EventBus,
    jobs: JobSystem,
    pub(crate) scheduler: Scheduler,
    /// Set while a tick is driving the scheduler.
    pub(crate) running: bool,
    config: Config,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world which runs its jobs on rayon's global pool.
    pub fn new() -> Self {
        Self::build(Config::default(), JobSystem::global())
    }

    /// Creates a world with the given configuration, building
    /// a dedicated worker pool if one is requested.
    pub fn with_config(config: Config) -> Result<Self> {
        let jobs = JobSystem::new(&config)?;
        Ok(Self::build(config, jobs))
    }

    fn build(config: Config, jobs: JobSystem) -> Self {
        World {
            entities: EntityAllocator::with_capacity(config.initial_entity_capacity),
            components: Components::default(),
            storages: Vec::new(),
            groups: Groups::default(),
            events: EventBus::new(),
            jobs,
            scheduler: Scheduler::default(),
            running: false,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the job system systems should schedule their work on.
    pub fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    /// Creates a new entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.alloc();
        log::trace!("created entity {}", entity);
        self.groups.on_created(entity);
        entity
    }

    /// Destroys an entity along with all of its components.
    ///
    /// `ComponentRemoved` is emitted for every component the entity
    /// held, followed by `EntityDisposed` once its index is released.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        self.check_alive(entity)?;
        self.groups.on_disposed(entity);

        for (index, cell) in self.storages.iter().enumerate() {
            let cell = match cell {
                Some(cell) => cell,
                None => continue,
            };

            let removed = cell.borrow_mut().remove_entity(entity);
            if removed {
                if let Some(info) = self.components.info(ComponentId(index as u32)) {
                    (info.emit_removed)(&self.events, entity);
                }
            }
        }

        self.entities.free(entity);
        log::trace!("destroyed entity {}", entity);
        self.events.emit(EntityDisposed { entity });
        Ok(())
    }

    /// Determines if the given `Entity` is alive within this `World`.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Returns the number of live entities.
    pub fn alive_count(&self) -> usize {
        self.entities.allocated()
    }

    /// Iterates over live entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Returns the id of component type `T`, assigning one
    /// if `T` has not been seen by this world.
    pub fn component_id<T>(&mut self) -> ComponentId
    where
        T: Component,
    {
        self.components.register::<T>()
    }

    /// Returns the id of `T` without registering it.
    pub fn lookup_component<T>(&self) -> Option<ComponentId>
    where
        T: Component,
    {
        self.components.get::<T>()
    }

    /// Returns the number of component types this world has seen.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.info(id)
    }

    pub fn component_name(&self, id: ComponentId) -> Option<&'static str> {
        self.components.info(id).map(ComponentInfo::name)
    }

    /// Adds a component to an entity, or sets its value if the component
    /// is already present.
    ///
    /// Emits `ComponentAdded` for a new component and `ComponentUpdated`
    /// when an existing value was overwritten.
    pub fn add<T>(&mut self, entity: Entity, component: T) -> Result<()>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::PerEntity)?;
        self.check_alive(entity)?;

        let id = self.component_id::<T>();
        let previous = storage::borrow_mut::<SparseSet<T>>(self.sparse_cell::<T>(id))
            .insert(entity, component);

        match previous {
            None => {
                self.refresh_groups(entity, id);
                self.events.emit(ComponentAdded::<T>::new(entity));
            }
            Some(_) => self.events.emit(ComponentUpdated::<T>::new(entity)),
        }
        Ok(())
    }

    /// Overwrites a component, emitting `ComponentPreUpdated` with the
    /// old and new values before the write and `ComponentUpdated`
    /// after it. Adds the component if the entity does not have it.
    pub fn update<T>(&mut self, entity: Entity, component: T) -> Result<()>
    where
        T: Component + Clone,
    {
        expect_kind::<T>(StorageKind::PerEntity)?;
        self.check_alive(entity)?;

        let cell = match self.typed_cell::<T>().cloned() {
            Some(cell) => cell,
            None => return self.add(entity, component),
        };
        if !storage::borrow::<SparseSet<T>>(&cell).contains(entity) {
            return self.add(entity, component);
        }

        if self.events.has_subscribers::<ComponentPreUpdated<T>>() {
            let old = storage::borrow::<SparseSet<T>>(&cell).get(entity).cloned();
            if let Some(old) = old {
                self.events.emit(ComponentPreUpdated {
                    entity,
                    old,
                    new: component.clone(),
                });
            }
        }

        storage::borrow_mut::<SparseSet<T>>(&cell).insert(entity, component);
        self.events.emit(ComponentUpdated::<T>::new(entity));
        Ok(())
    }

    /// Borrows component `T` of the given entity.
    ///
    /// For shared components this yields the shared value if the
    /// entity is one of its owners.
    ///
    /// # Panics
    /// Panics if the storage of `T` is mutably borrowed.
    pub fn get<T>(&self, entity: Entity) -> Option<AtomicRef<'_, T>>
    where
        T: Component,
    {
        let cell = self.typed_cell::<T>()?;
        match T::STORAGE {
            StorageKind::PerEntity => AtomicRef::filter_map(
                storage::borrow::<SparseSet<T>>(cell),
                |storage| storage.get(entity),
            )
            .ok(),
            StorageKind::Shared => AtomicRef::filter_map(
                storage::borrow::<SharedStorage<T>>(cell),
                |storage| {
                    if storage.is_owner(entity) {
                        storage.value()
                    } else {
                        None
                    }
                },
            )
            .ok(),
            StorageKind::Static => None,
        }
    }

    /// Mutably borrows component `T` of the given entity.
    ///
    /// Access is checked at runtime: the whole storage of `T` stays
    /// borrowed until the guard is dropped.
    ///
    /// # Panics
    /// Panics if the storage of `T` is already borrowed.
    pub fn get_mut<T>(&self, entity: Entity) -> Option<AtomicRefMut<'_, T>>
    where
        T: Component,
    {
        let cell = self.typed_cell::<T>()?;
        match T::STORAGE {
            StorageKind::PerEntity => AtomicRefMut::filter_map(
                storage::borrow_mut::<SparseSet<T>>(cell),
                |storage| storage.get_mut(entity),
            ),
            StorageKind::Shared => AtomicRefMut::filter_map(
                storage::borrow_mut::<SharedStorage<T>>(cell),
                |storage| {
                    if storage.is_owner(entity) {
                        storage.value_mut()
                    } else {
                        None
                    }
                },
            ),
            StorageKind::Static => None,
        }
    }

    /// Checks if the given entity has component `T`, or
    /// owns it if `T` is shared.
    pub fn has<T>(&self, entity: Entity) -> bool
    where
        T: Component,
    {
        self.typed_cell::<T>()
            .map_or(false, |cell| cell.borrow().contains(entity))
    }

    /// Removes a component from an entity, returning it.
    ///
    /// Removing a component the entity does not have is a no-op
    /// and returns `Ok(None)`.
    pub fn remove<T>(&mut self, entity: Entity) -> Result<Option<T>>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::PerEntity)?;
        self.check_alive(entity)?;

        let id = match self.components.get::<T>() {
            Some(id) => id,
            None => return Ok(None),
        };
        let cell = match self.cell(id) {
            Some(cell) => cell,
            None => return Ok(None),
        };

        let removed = storage::borrow_mut::<SparseSet<T>>(cell).remove(entity);
        if removed.is_some() {
            self.refresh_groups(entity, id);
            self.events.emit(ComponentRemoved::<T>::new(entity));
        }
        Ok(removed)
    }

    /// Returns a handle onto the storage of `T`, creating
    /// the storage if needed.
    pub fn column<T>(&mut self) -> Result<Column<T>>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::PerEntity)?;
        let id = self.component_id::<T>();
        let cell = Arc::clone(self.sparse_cell::<T>(id));
        Ok(Column::new(cell, id))
    }

    /// Returns a handle onto the storage of `T` if it exists.
    pub fn try_column<T>(&self) -> Option<Column<T>>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::PerEntity {
            return None;
        }
        let id = self.components.get::<T>()?;
        let cell = self.cell(id)?;
        Some(Column::new(Arc::clone(cell), id))
    }

    /// Borrows the static component `T`, if it has been set.
    pub fn read_static<T>(&self) -> Option<AtomicRef<'_, T>>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::Static {
            return None;
        }
        let cell = self.typed_cell::<T>()?;
        AtomicRef::filter_map(storage::borrow::<StaticStorage<T>>(cell), StaticStorage::get).ok()
    }

    /// Mutably borrows the static component `T`, if it has been set.
    pub fn static_mut<T>(&self) -> Option<AtomicRefMut<'_, T>>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::Static {
            return None;
        }
        let cell = self.typed_cell::<T>()?;
        AtomicRefMut::filter_map(
            storage::borrow_mut::<StaticStorage<T>>(cell),
            StaticStorage::get_mut,
        )
    }

    /// Sets the static component `T`, returning the previous value.
    pub fn replace_static<T>(&mut self, value: T) -> Result<Option<T>>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::Static)?;
        let id = self.component_id::<T>();
        let cell = self.cell_or_init(id, StaticStorage::<T>::new);
        Ok(storage::borrow_mut::<StaticStorage<T>>(cell).replace(value))
    }

    /// Mutably borrows the static component `T`, initializing
    /// it with its default value on first access.
    pub fn static_or_default<T>(&mut self) -> Result<AtomicRefMut<'_, T>>
    where
        T: Component + Default,
    {
        expect_kind::<T>(StorageKind::Static)?;
        let id = self.component_id::<T>();
        let cell = self.cell_or_init(id, StaticStorage::<T>::new);
        Ok(AtomicRefMut::map(
            storage::borrow_mut::<StaticStorage<T>>(cell),
            |storage| storage.get_or_insert_with(T::default),
        ))
    }

    /// Sets the instance of shared component `T`, returning the
    /// previous one. Owners are kept.
    pub fn set_shared<T>(&mut self, value: T) -> Result<Option<T>>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::Shared)?;
        let id = self.component_id::<T>();
        let cell = self.cell_or_init(id, SharedStorage::<T>::new);
        Ok(storage::borrow_mut::<SharedStorage<T>>(cell).set(value))
    }

    /// Borrows the instance of shared component `T`, if set.
    pub fn read_shared<T>(&self) -> Option<AtomicRef<'_, T>>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::Shared {
            return None;
        }
        let cell = self.typed_cell::<T>()?;
        AtomicRef::filter_map(storage::borrow::<SharedStorage<T>>(cell), SharedStorage::value).ok()
    }

    /// Mutably borrows the instance of shared component `T`, if set.
    pub fn shared_mut<T>(&self) -> Option<AtomicRefMut<'_, T>>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::Shared {
            return None;
        }
        let cell = self.typed_cell::<T>()?;
        AtomicRefMut::filter_map(
            storage::borrow_mut::<SharedStorage<T>>(cell),
            SharedStorage::value_mut,
        )
    }

    /// Makes `entity` an owner of shared component `T`.
    ///
    /// Ownership counts as holding `T` for `has` and for groups, and
    /// emits `ComponentAdded`. Returns `false` if the entity already
    /// was an owner.
    pub fn add_owner<T>(&mut self, entity: Entity) -> Result<bool>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::Shared)?;
        self.check_alive(entity)?;

        let id = self.component_id::<T>();
        let cell = self.cell_or_init(id, SharedStorage::<T>::new);
        let added = storage::borrow::<SharedStorage<T>>(cell).add_owner(entity);
        if added {
            self.refresh_groups(entity, id);
            self.events.emit(ComponentAdded::<T>::new(entity));
        }
        Ok(added)
    }

    /// Drops `entity` from the owners of shared component `T`,
    /// emitting `ComponentRemoved`. Returns `false` if it was
    /// not an owner.
    pub fn remove_owner<T>(&mut self, entity: Entity) -> Result<bool>
    where
        T: Component,
    {
        expect_kind::<T>(StorageKind::Shared)?;
        self.check_alive(entity)?;

        let id = match self.components.get::<T>() {
            Some(id) => id,
            None => return Ok(false),
        };
        let cell = match self.cell(id) {
            Some(cell) => cell,
            None => return Ok(false),
        };

        let removed = storage::borrow::<SharedStorage<T>>(cell).remove_owner(entity);
        if removed {
            self.refresh_groups(entity, id);
            self.events.emit(ComponentRemoved::<T>::new(entity));
        }
        Ok(removed)
    }

    pub fn is_owner<T>(&self, entity: Entity) -> bool
    where
        T: Component,
    {
        T::STORAGE == StorageKind::Shared && self.has::<T>(entity)
    }

    /// Returns the current owners of shared component `T`.
    pub fn owners<T>(&self) -> Vec<Entity>
    where
        T: Component,
    {
        if T::STORAGE != StorageKind::Shared {
            return Vec::new();
        }
        self.typed_cell::<T>()
            .map_or_else(Vec::new, |cell| cell.borrow().holders())
    }

    /// Starts building a filter from component types.
    pub fn filter(&mut self) -> FilterBuilder<'_> {
        FilterBuilder::new(self)
    }

    /// Compiles a group from required and excluded component ids.
    pub fn create_group(
        &mut self,
        required: &[ComponentId],
        excluded: &[ComponentId],
    ) -> GroupHandle {
        self.group(Filter::from_ids(required, excluded))
    }

    /// Compiles a filter into a group.
    ///
    /// Returns the existing group if a structurally equal filter was
    /// compiled before. Otherwise the new group's members are computed
    /// once here and kept current from then on.
    pub fn group(&mut self, filter: Filter) -> GroupHandle {
        if let Some(group) = self.groups.get(&filter) {
            return group;
        }

        let members = if filter.is_contradictory() {
            log::warn!(
                "filter {:?} both requires and excludes a component; its group will stay empty",
                filter
            );
            Vec::new()
        } else {
            self.candidates(&filter)
                .into_iter()
                .filter(|&entity| filter.matches(|id| self.has_id(id, entity)))
                .collect()
        };

        log::debug!("compiled group {:?} with {} members", filter, members.len());
        self.groups.insert(filter, members)
    }

    /// Returns the number of compiled groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers an event handler. See `EventBus::subscribe`.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Entities which may match `filter`: the holders of its rarest
    /// required component, or every live entity if it requires none.
    fn candidates(&self, filter: &Filter) -> Vec<Entity> {
        if filter.required().is_empty() {
            return self.entities.iter().collect();
        }

        let mut smallest: Option<(usize, &StorageCell)> = None;
        for &id in filter.required() {
            let cell = match self.cell(id) {
                Some(cell) => cell,
                None => return Vec::new(),
            };
            let len = cell.borrow().len();
            if smallest.map_or(true, |(min, _)| len < min) {
                smallest = Some((len, cell));
            }
        }

        smallest.map_or_else(Vec::new, |(_, cell)| cell.borrow().holders())
    }

    fn refresh_groups(&self, entity: Entity, id: ComponentId) {
        self.groups
            .on_changed(entity, id, |id| self.has_id(id, entity));
    }

    fn has_id(&self, id: ComponentId, entity: Entity) -> bool {
        self.cell(id)
            .map_or(false, |cell| cell.borrow().contains(entity))
    }

    fn check_alive(&self, entity: Entity) -> Result<()> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(Error::DeadEntity(entity))
        }
    }

    fn cell(&self, id: ComponentId) -> Option<&StorageCell> {
        self.storages.get(id.index())?.as_ref()
    }

    fn typed_cell<T: Component>(&self) -> Option<&StorageCell> {
        self.cell(self.components.get::<T>()?)
    }

    fn cell_or_init<S: Storage>(&mut self, id: ComponentId, init: impl FnOnce() -> S) -> &StorageCell {
        if self.storages.len() <= id.index() {
            self.storages.resize_with(id.index() + 1, || None);
        }
        self.storages[id.index()].get_or_insert_with(|| storage::new_cell(init()))
    }

    fn sparse_cell<T: Component>(&mut self, id: ComponentId) -> &StorageCell {
        let capacity = self.config.initial_entity_capacity;
        self.cell_or_init(id, || SparseSet::<T>::with_capacity(capacity))
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.destroy_systems();
    }
}

fn expect_kind<T: Component>(expected: StorageKind) -> Result<()> {
    if T::STORAGE == expected {
        Ok(())
    } else {
        Err(Error::StorageKind {
            component: std::any::type_name::<T>(),
            expected,
            actual: T::STORAGE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[test]
    fn storages_are_created_lazily() {
        let mut world = World::new();
        let entity = world.create_entity();

        assert!(world.storages.is_empty());
        assert!(!world.has::<Health>(entity));
        assert_eq!(world.remove::<Health>(entity).unwrap(), None);

        world.add(entity, Health(10)).unwrap();
        assert_eq!(world.storages.len(), 1);
        assert_eq!(*world.get::<Health>(entity).unwrap(), Health(10));
    }

    #[test]
    fn candidates_come_from_rarest_storage() {
        #[derive(Debug)]
        struct Rare;
        impl Component for Rare {}

        let mut world = World::new();
        let entities: Vec<_> = (0..10).map(|_| world.create_entity()).collect();
        for &entity in &entities {
            world.add(entity, Health(1)).unwrap();
        }
        world.add(entities[3], Rare).unwrap();

        let filter = world.filter().with::<Health>().with::<Rare>().build();
        assert_eq!(world.candidates(&filter), vec![entities[3]]);
    }
}
