use crate::component::Component;
use crate::entity::Entity;
use crate::error::Result;
use crate::world::World;
use std::any::TypeId;
use std::ops::{Deref, DerefMut};

type Insert = Box<dyn FnOnce(&mut World, Entity) -> Result<()> + Send>;

/// Collects components for an entity before it is spawned.
#[derive(Default)]
pub struct EntityBuilder {
    /// Pending insertions, one per component type, in the
    /// order the types were first added.
    components: Vec<(TypeId, Insert)>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<C>(mut self, component: C) -> Self
    where
        C: Component,
    {
        self.add(component);

        self
    }

    pub fn add<C>(&mut self, component: C) -> &mut Self
    where
        C: Component,
    {
        let insert: Insert =
            Box::new(move |world: &mut World, entity: Entity| world.add(entity, component));

        // If the component already exists in the builder,
        // then override it.
        match self
            .components
            .iter_mut()
            .find(|(type_id, _)| *type_id == TypeId::of::<C>())
        {
            Some((_, existing)) => *existing = insert,
            None => self.components.push((TypeId::of::<C>(), insert)),
        }

        self
    }

    /// Returns the number of distinct component types added.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn build(self) -> BuiltEntity<'static> {
        BuiltEntity {
            builder: CowMut::Owned(self),
        }
    }

    /// Builds an entity from the components added so far. Spawning
    /// it empties this builder so it can be filled again.
    pub fn build_one(&mut self) -> BuiltEntity {
        BuiltEntity {
            builder: CowMut::Borrowed(self),
        }
    }
}

enum CowMut<'a, T> {
    Borrowed(&'a mut T),
    Owned(T),
}

impl<'a, T> Deref for CowMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            CowMut::Borrowed(x) => *x,
            CowMut::Owned(x) => x,
        }
    }
}

impl<'a, T> DerefMut for CowMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            CowMut::Borrowed(x) => *x,
            CowMut::Owned(x) => x,
        }
    }
}

pub struct BuiltEntity<'a> {
    builder: CowMut<'a, EntityBuilder>,
}

impl<'a> BuiltEntity<'a> {
    /// Creates the entity and inserts every component into it.
    ///
    /// If an insertion fails, the half-built entity is destroyed
    /// and the error returned.
    pub fn spawn_in(mut self, world: &mut World) -> Result<Entity> {
        let entity = world.create_entity();

        for (_, insert) in self.builder.components.drain(..) {
            if let Err(e) = insert(world, entity) {
                world.destroy_entity(entity)?;
                return Err(e);
            }
        }

        Ok(entity)
    }
}
