//! Persistent, incrementally maintained queries.
//!
//! A `Filter` lists the component ids an entity must hold and the
//! ids it must not hold. Compiling a filter in a `World` yields a
//! `GroupHandle`; structurally equal filters share one group. The
//! world keeps every group's membership current as components are
//! added and removed, re-testing only the entity that changed.

use crate::borrow::{AtomicRef, AtomicRefCell, AtomicRefMut};
use crate::component::{Component, ComponentId};
use crate::entity::Entity;
use crate::storage::{Column, SparseSet};
use crate::util::HashMap;
use crate::world::World;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Required and excluded component ids of a group.
///
/// Both lists are kept sorted and free of duplicates, so two
/// filters built from the same sets in any order compare and
/// hash equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    required: Vec<ComponentId>,
    excluded: Vec<ComponentId>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(required: &[ComponentId], excluded: &[ComponentId]) -> Self {
        let mut filter = Self::new();
        for &id in required {
            insert_sorted(&mut filter.required, id);
        }
        for &id in excluded {
            insert_sorted(&mut filter.excluded, id);
        }
        filter
    }

    pub fn require(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.required, id);
        self
    }

    pub fn exclude(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.excluded, id);
        self
    }

    pub fn required(&self) -> &[ComponentId] {
        &self.required
    }

    pub fn excluded(&self) -> &[ComponentId] {
        &self.excluded
    }

    /// Whether changes to component `id` can affect membership.
    pub fn references(&self, id: ComponentId) -> bool {
        self.required.binary_search(&id).is_ok() || self.excluded.binary_search(&id).is_ok()
    }

    /// Whether some id is both required and excluded.
    /// Such a filter matches no entity.
    pub fn is_contradictory(&self) -> bool {
        self.required
            .iter()
            .any(|id| self.excluded.binary_search(id).is_ok())
    }

    /// Tests an entity, given a predicate telling whether it
    /// holds a component.
    pub fn matches(&self, has: impl Fn(ComponentId) -> bool) -> bool {
        !self.is_contradictory()
            && self.required.iter().all(|&id| has(id))
            && !self.excluded.iter().any(|&id| has(id))
    }
}

fn insert_sorted(ids: &mut Vec<ComponentId>, id: ComponentId) {
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

/// Builds a `Filter` from component types, registering
/// their ids in the world as needed.
pub struct FilterBuilder<'w> {
    world: &'w mut World,
    filter: Filter,
}

impl<'w> FilterBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            filter: Filter::new(),
        }
    }

    /// Requires component `T`.
    pub fn with<T: Component>(mut self) -> Self {
        let id = self.world.component_id::<T>();
        self.filter = self.filter.require(id);
        self
    }

    /// Excludes component `T`.
    pub fn without<T: Component>(mut self) -> Self {
        let id = self.world.component_id::<T>();
        self.filter = self.filter.exclude(id);
        self
    }

    pub fn build(self) -> Filter {
        self.filter
    }

    /// Compiles the filter into a group.
    pub fn group(self) -> GroupHandle {
        self.world.group(self.filter)
    }
}

/// The live set of entities matching a `Filter`.
pub struct Group {
    filter: Filter,
    members: AtomicRefCell<SparseSet<()>>,
}

impl Group {
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Tests membership in constant time.
    pub fn contains(&self, entity: Entity) -> bool {
        self.members.borrow().contains(entity)
    }

    /// Returns a snapshot of the current members.
    pub fn entities(&self) -> Vec<Entity> {
        self.members.borrow().entities().to_vec()
    }

    /// Borrows the member set.
    ///
    /// # Panics
    /// Membership is updated by the world whenever a referenced
    /// component changes; doing so while this guard is held panics.
    pub fn members(&self) -> AtomicRef<'_, SparseSet<()>> {
        self.members.borrow()
    }

    /// Borrows the values of `T` held by members.
    pub fn view<'a, T: Component>(&'a self, column: &'a Column<T>) -> View<'a, T> {
        View {
            members: self.members.borrow(),
            storage: column.borrow(),
        }
    }

    /// Mutably borrows the values of `T` held by members.
    pub fn view_mut<'a, T: Component>(&'a self, column: &'a Column<T>) -> ViewMut<'a, T> {
        ViewMut {
            members: self.members.borrow(),
            storage: column.borrow_mut(),
        }
    }

    /// Re-tests a single entity and updates membership accordingly.
    pub(crate) fn refresh(&self, entity: Entity, has: impl Fn(ComponentId) -> bool) {
        let matches = self.filter.matches(has);
        let mut members = self.members.borrow_mut();
        if matches {
            members.insert(entity, ());
        } else {
            members.remove(entity);
        }
    }

    pub(crate) fn evict(&self, entity: Entity) {
        self.members.borrow_mut().remove(entity);
    }
}

impl Debug for Group {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Group")
            .field("filter", &self.filter)
            .field("len", &self.len())
            .finish()
    }
}

/// Read-only access to one component type of a group's members.
pub struct View<'a, T> {
    members: AtomicRef<'a, SparseSet<()>>,
    storage: AtomicRef<'a, SparseSet<T>>,
}

impl<'a, T> View<'a, T> {
    pub fn get(&self, entity: Entity) -> Option<&T> {
        if self.members.contains(entity) {
            self.storage.get(entity)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        let storage = &self.storage;
        self.members
            .entities()
            .iter()
            .filter_map(move |&entity| storage.get(entity).map(|value| (entity, value)))
    }
}

/// Mutable access to one component type of a group's members.
pub struct ViewMut<'a, T> {
    members: AtomicRef<'a, SparseSet<()>>,
    storage: AtomicRefMut<'a, SparseSet<T>>,
}

impl<'a, T> ViewMut<'a, T> {
    pub fn get(&self, entity: Entity) -> Option<&T> {
        if self.members.contains(entity) {
            self.storage.get(entity)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        if self.members.contains(entity) {
            self.storage.get_mut(entity)
        } else {
            None
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> + '_ {
        let members = &self.members;
        self.storage
            .iter_mut()
            .filter(move |(entity, _)| members.contains(*entity))
    }
}

/// A shared reference to a compiled group.
///
/// Handles compare equal when they refer to the same group.
#[derive(Clone)]
pub struct GroupHandle(Arc<Group>);

impl Deref for GroupHandle {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.0
    }
}

impl PartialEq for GroupHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for GroupHandle {}

impl Debug for GroupHandle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

/// All groups compiled in a world, plus the per-component
/// subscription lists used to route changes to them.
#[derive(Default)]
pub(crate) struct Groups {
    by_filter: HashMap<Filter, GroupHandle>,
    /// Groups referencing each component id, indexed by id.
    subscriptions: Vec<Vec<GroupHandle>>,
    /// Groups with no required component; these may admit an
    /// entity as soon as it is created.
    unconstrained: Vec<GroupHandle>,
}

impl Groups {
    pub fn get(&self, filter: &Filter) -> Option<GroupHandle> {
        self.by_filter.get(filter).cloned()
    }

    /// Adds a new group whose initial members are `members`.
    pub fn insert(&mut self, filter: Filter, members: impl IntoIterator<Item = Entity>) -> GroupHandle {
        let mut set = SparseSet::new();
        for entity in members {
            set.insert(entity, ());
        }

        let handle = GroupHandle(Arc::new(Group {
            filter: filter.clone(),
            members: AtomicRefCell::new(set),
        }));

        for &id in filter.required().iter().chain(filter.excluded()) {
            if self.subscriptions.len() <= id.index() {
                self.subscriptions.resize_with(id.index() + 1, Vec::new);
            }
            let subscribers = &mut self.subscriptions[id.index()];
            if !subscribers.contains(&handle) {
                subscribers.push(handle.clone());
            }
        }
        if filter.required().is_empty() {
            self.unconstrained.push(handle.clone());
        }

        self.by_filter.insert(filter, handle.clone());
        handle
    }

    /// Re-tests `entity` in every group referencing `id`.
    pub fn on_changed(&self, entity: Entity, id: ComponentId, has: impl Fn(ComponentId) -> bool) {
        if let Some(groups) = self.subscriptions.get(id.index()) {
            for group in groups {
                group.refresh(entity, &has);
            }
        }
    }

    pub fn on_created(&self, entity: Entity) {
        // A fresh entity holds nothing, so it only fails
        // filters with requirements.
        for group in &self.unconstrained {
            group.refresh(entity, |_| false);
        }
    }

    pub fn on_disposed(&self, entity: Entity) {
        for group in self.by_filter.values() {
            group.evict(entity);
        }
    }

    pub fn len(&self) -> usize {
        self.by_filter.len()
    }
}
