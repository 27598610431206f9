use crate::entity::Entity;
use crate::events::{ComponentRemoved, EventBus};
use crate::util::HashMap;
use std::any::TypeId;
use std::fmt::{self, Display, Formatter};

/// The storage kind backing a component type. A type keeps
/// the same kind for the lifetime of the process since it is
/// fixed by `Component::STORAGE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// One value per entity, kept in a sparse set.
    PerEntity,
    /// A single value not scoped to any entity,
    /// e.g. the active camera or the input state.
    Static,
    /// A single value referenced by a dynamic set of owning entities.
    Shared,
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            StorageKind::PerEntity => "per-entity",
            StorageKind::Static => "static",
            StorageKind::Shared => "shared",
        };
        f.write_str(name)
    }
}

/// A type which can be used as a component.
///
/// Components can be any `Send + Sync + 'static` type.
/// To easily implement `Component` for your type,
/// we provide the `Component` derive macro.
pub trait Component: Send + Sync + 'static {
    /// How values of this type are stored.
    const STORAGE: StorageKind = StorageKind::PerEntity;
}

/// A small integer identifying a component type within a `World`.
///
/// Ids are assigned in registration order, starting at zero,
/// and never change afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Returns the id as an index into per-type tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static information about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub(crate) name: &'static str,
    pub(crate) kind: StorageKind,
    /// Emits the typed `ComponentRemoved` event for this component
    /// where only the id is known, e.g. when destroying an entity.
    pub(crate) emit_removed: fn(&EventBus, Entity),
}

impl ComponentInfo {
    /// Returns the Rust type name of the component.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the storage kind of the component.
    pub fn kind(&self) -> StorageKind {
        self.kind
    }
}

/// Assigns `ComponentId`s to component types.
#[derive(Default)]
pub(crate) struct Components {
    ids: HashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
}

impl Components {
    /// Returns the id of `C`, registering it if this
    /// is the first time the type is seen.
    pub fn register<C: Component>(&mut self) -> ComponentId {
        let infos = &mut self.infos;
        *self.ids.entry(TypeId::of::<C>()).or_insert_with(|| {
            let id = ComponentId(infos.len() as u32);
            infos.push(ComponentInfo {
                name: std::any::type_name::<C>(),
                kind: C::STORAGE,
                emit_removed: |events, entity| events.emit(ComponentRemoved::<C>::new(entity)),
            });
            log::debug!(
                "registered {} component {} as {}",
                C::STORAGE,
                std::any::type_name::<C>(),
                id
            );
            id
        })
    }

    /// Returns the id of `C` if it has been registered.
    pub fn get<C: Component>(&self) -> Option<ComponentId> {
        self.ids.get(&TypeId::of::<C>()).copied()
    }

    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Camera;
    impl Component for Camera {
        const STORAGE: StorageKind = StorageKind::Static;
    }

    #[test]
    fn ids_are_stable_and_dense() {
        let mut components = Components::default();

        let position = components.register::<Position>();
        let camera = components.register::<Camera>();

        assert_eq!(position.index(), 0);
        assert_eq!(camera.index(), 1);
        assert_eq!(components.register::<Position>(), position);
        assert_eq!(components.len(), 2);

        assert_eq!(components.info(camera).unwrap().kind(), StorageKind::Static);
        assert!(components.info(position).unwrap().name().ends_with("Position"));
    }
}
