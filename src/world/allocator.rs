use crate::entity::Entity;
use std::collections::VecDeque;

/// Smallest number of index slots reserved once the allocator first grows.
const MIN_CAPACITY: usize = 64;

/// Handles allocation of entity indices and tracks which
/// of them are currently alive.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// The set of free indices. An index is pushed here when its
    /// entity is destroyed and reused before any new index is issued.
    free: VecDeque<u32>,
    /// Current generation of each index.
    generations: Vec<u32>,
    /// Whether the entity at each index is alive.
    alive: Vec<bool>,
    /// Number of live entities.
    live: usize,
}

impl EntityAllocator {
    /// Creates a new, empty `EntityAllocator`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator with room for `capacity` indices
    /// before it has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: VecDeque::new(),
            generations: Vec::with_capacity(capacity),
            alive: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Allocates a new entity, preferring recycled indices.
    pub fn alloc(&mut self) -> Entity {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => self.grow(),
        };

        self.alive[index as usize] = true;
        self.live += 1;
        Entity::new(index, self.generations[index as usize])
    }

    /// Frees an entity, returning its index to the recycle pool.
    ///
    /// Returns `false` if the entity was not alive.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        let index = entity.index as usize;
        self.alive[index] = false;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.push_back(entity.index);
        self.live -= 1;
        true
    }

    /// Determines whether the given entity is alive: its index is
    /// in use and its generation matches the current one.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index as usize;
        index < self.alive.len()
            && self.alive[index]
            && self.generations[index] == entity.generation
    }

    /// Returns the live entity currently occupying `index`, if any.
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        let i = index as usize;
        if i < self.alive.len() && self.alive[i] {
            Some(Entity::new(index, self.generations[i]))
        } else {
            None
        }
    }

    /// Returns the number of live entities.
    pub fn allocated(&self) -> usize {
        self.live
    }

    /// Returns one past the largest index ever issued.
    pub fn index_bound(&self) -> usize {
        self.alive.len()
    }

    /// Iterates over all live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.alive.len() as u32).filter_map(move |index| self.entity_at(index))
    }

    /// Issues a fresh index, doubling the reserved index space
    /// when it is exhausted.
    fn grow(&mut self) -> u32 {
        let index = self.alive.len();
        assert!(index < u32::MAX as usize, "entity index space exhausted");

        if index == self.alive.capacity() {
            let additional = index.max(MIN_CAPACITY);
            self.alive.reserve_exact(additional);
            self.generations.reserve_exact(additional);
        }

        self.alive.push(false);
        self.generations.push(0);
        index as u32
    }
}
