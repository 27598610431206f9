//! A sparse-set entity component system with phased,
//! parallel system scheduling.

// Lets `#[derive(Component)]` refer to `::phecs` inside this crate too.
extern crate self as phecs;

mod borrow;
mod builder;
mod component;
mod config;
mod entity;
mod error;
mod events;
mod group;
mod job;
mod storage;
mod system;
mod util;
mod world;

pub use borrow::{AtomicRef, AtomicRefCell, AtomicRefMut, ImmutablyBorrowed, MutablyBorrowed};
pub use builder::{BuiltEntity, EntityBuilder};
pub use component::{Component, ComponentId, ComponentInfo, StorageKind};
pub use config::Config;
pub use entity::Entity;
pub use error::{Error, Result, SystemError};
pub use events::{
    ComponentAdded, ComponentPreUpdated, ComponentRemoved, ComponentUpdated, EntityDisposed, Event,
    EventBus, SubscriptionId,
};
pub use group::{Filter, FilterBuilder, Group, GroupHandle, View, ViewMut};
pub use job::{JobHandle, JobSystem};
pub use phecs_macros::Component;
pub use storage::{Column, SharedStorage, SparseSet, StaticStorage};
pub use system::{Phase, RemoveTag, System, SystemCtx, SystemResult};
pub use world::{EntityAllocator, World};
