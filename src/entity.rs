use std::fmt::{self, Display, Formatter};

/// A handle to an entity in a `World`.
///
/// Entity indices are recycled once an entity is destroyed,
/// so a handle kept across a destroy may refer to a newer entity
/// with the same index. The generation distinguishes the two;
/// always consult `World::is_alive` before trusting an old handle.
///
/// # Representation
/// `Entity` is guaranteed to have the same representation
/// as the following C struct:
/// ```c
/// struct Entity {
///     uint32_t index;
///     uint32_t generation;
/// }
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(C)]
pub struct Entity {
    /// The index into sparse component storages.
    pub(crate) index: u32,
    /// The entity's generation, used to avoid the ABA problem.
    pub(crate) generation: u32,
}

impl Entity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the index of this entity. Indices are
    /// unique among live entities but are reused after destruction.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation of this entity's index.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}
