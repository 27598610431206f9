//! Systems and the phase scheduler.
//!
//! Every tick walks a fixed sequence of phases. Systems in the
//! main-thread phases run one after another in registration order
//! with exclusive access to the `World`. Systems in
//! `Phase::MultiThread` only get shared access; they move columns
//! and groups into jobs and return the job handles, which the
//! scheduler joins before the next phase begins.

use crate::component::{Component, StorageKind};
use crate::error::{Error, Result, SystemError};
use crate::group::GroupHandle;
use crate::job::{JobHandle, JobSystem};
use crate::util::HashSet;
use crate::world::World;
use std::any::TypeId;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

/// Return type of `System::execute`: optionally a handle to
/// work the system left running.
pub type SystemResult = std::result::Result<Option<JobHandle>, SystemError>;

/// A named stage of the per-tick schedule.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    EarlyMainThread,
    /// The only phase whose systems may leave parallel jobs running.
    MultiThread,
    LateMainThread,
    /// Systems stripping one-frame marker components.
    RemoveTags,
    /// Driven by `World::physics_tick` rather than `World::tick`.
    Physics,
    /// Driven by `World::gizmos_tick`. Only exists in debug builds.
    #[cfg(debug_assertions)]
    Gizmos,
}

#[cfg(debug_assertions)]
const PHASE_COUNT: usize = 6;
#[cfg(not(debug_assertions))]
const PHASE_COUNT: usize = 5;

impl Phase {
    /// The phases `World::tick` runs, in order.
    pub const TICK: [Phase; 4] = [
        Phase::EarlyMainThread,
        Phase::MultiThread,
        Phase::LateMainThread,
        Phase::RemoveTags,
    ];

    /// Whether systems of this phase run with shared world access
    /// and may return pending job handles.
    pub fn is_parallel(self) -> bool {
        self == Phase::MultiThread
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A unit of logic run by the scheduler each tick.
///
/// The system value holds its private state. It is created once by
/// `init` at registration, typically compiling the groups and
/// fetching the columns it needs, and is dropped exactly once,
/// after `destroy`, when it is unregistered or the world is dropped.
pub trait System: Send + 'static {
    fn init(world: &mut World) -> std::result::Result<Self, SystemError>
    where
        Self: Sized;

    fn execute(&mut self, ctx: &mut SystemCtx<'_>) -> SystemResult;

    /// Called before the system is dropped.
    fn destroy(&mut self, _world: &mut World) {}

    /// Called on every `World::gizmos_tick`, whatever the system's phase.
    #[cfg(debug_assertions)]
    fn draw_gizmos(&mut self, _world: &World) {}
}

enum WorldAccess<'a> {
    Exclusive(&'a mut World),
    Shared(&'a World),
}

/// What a system sees while it executes.
pub struct SystemCtx<'a> {
    world: WorldAccess<'a>,
    phase: Phase,
    delta_time: f32,
}

impl<'a> SystemCtx<'a> {
    pub fn world(&self) -> &World {
        match &self.world {
            WorldAccess::Exclusive(world) => &**world,
            WorldAccess::Shared(world) => *world,
        }
    }

    /// # Panics
    /// Panics during `Phase::MultiThread`, where the world is shared.
    pub fn world_mut(&mut self) -> &mut World {
        let phase = self.phase;
        match self.try_world_mut() {
            Some(world) => world,
            None => panic!("the world cannot be mutated during {:?}", phase),
        }
    }

    /// Returns the world mutably unless the current phase shares it.
    pub fn try_world_mut(&mut self) -> Option<&mut World> {
        match &mut self.world {
            WorldAccess::Exclusive(world) => Some(&mut **world),
            WorldAccess::Shared(_) => None,
        }
    }

    pub fn jobs(&self) -> &JobSystem {
        self.world().jobs()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seconds since the previous tick of this phase, as passed to
    /// `World::tick` or `World::physics_tick`.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }
}

struct SystemRecord {
    type_id: TypeId,
    name: &'static str,
    phase: Phase,
    system: Box<dyn System>,
}

/// Owns the registration records of a world.
#[derive(Default)]
pub(crate) struct Scheduler {
    phases: [Vec<SystemRecord>; PHASE_COUNT],
    registered: HashSet<TypeId>,
}

impl Scheduler {
    fn take(&mut self, type_id: TypeId) -> Option<SystemRecord> {
        self.phases.iter_mut().find_map(|records| {
            let pos = records.iter().position(|record| record.type_id == type_id)?;
            Some(records.remove(pos))
        })
    }

    fn len(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    fn run_phase(&mut self, world: &mut World, phase: Phase, delta_time: f32) -> Result<()> {
        let records = &mut self.phases[phase.slot()];

        if !phase.is_parallel() {
            for record in records.iter_mut() {
                let mut ctx = SystemCtx {
                    world: WorldAccess::Exclusive(&mut *world),
                    phase,
                    delta_time,
                };
                match record.system.execute(&mut ctx) {
                    Ok(Some(handle)) => join(phase, &handle)?,
                    Ok(None) => (),
                    Err(source) => return Err(system_failed(record, source)),
                }
            }
            return Ok(());
        }

        let mut handles = Vec::new();
        let mut failure = None;
        for record in records.iter_mut() {
            let mut ctx = SystemCtx {
                world: WorldAccess::Shared(&*world),
                phase,
                delta_time,
            };
            let system = &mut record.system;
            let executed = panic::catch_unwind(AssertUnwindSafe(|| system.execute(&mut ctx)));
            match executed {
                Ok(Ok(Some(handle))) => handles.push(handle),
                Ok(Ok(None)) => (),
                Ok(Err(source)) => {
                    failure = Some(system_failed(record, source));
                    break;
                }
                Err(payload) => {
                    log::error!("system {} panicked during {:?}", record.name, phase);
                    let _ = JobHandle::combine(handles).complete();
                    panic::resume_unwind(payload);
                }
            }
        }

        // Jobs already started must finish before the phase
        // returns, even if a later system failed.
        let joined = join(phase, &JobHandle::combine(handles));
        match failure {
            Some(error) => Err(error),
            None => joined,
        }
    }

    #[cfg(debug_assertions)]
    fn draw_gizmos(&mut self, world: &World) {
        for record in self.phases.iter_mut().flatten() {
            record.system.draw_gizmos(world);
        }
    }
}

fn system_failed(record: &SystemRecord, source: SystemError) -> Error {
    log::error!(
        "system {} failed during {:?}: {}",
        record.name,
        record.phase,
        source
    );
    Error::System {
        system: record.name,
        phase: record.phase,
        source,
    }
}

fn join(phase: Phase, handle: &JobHandle) -> Result<()> {
    handle.complete().map_err(|error| match error {
        Error::JobPanicked(message) => {
            log::error!("job failed during {:?}: {}", phase, message);
            Error::Job { phase, message }
        }
        other => other,
    })
}

impl World {
    /// Creates system `S` through its `init` and appends it to `phase`.
    ///
    /// Each system type can be registered once per world.
    pub fn register_system<S>(&mut self, phase: Phase) -> Result<()>
    where
        S: System,
    {
        let name = std::any::type_name::<S>();
        let type_id = TypeId::of::<S>();

        if self.running {
            return Err(Error::SchedulerBusy);
        }
        if self.scheduler.registered.contains(&type_id) {
            return Err(Error::DuplicateSystem(name));
        }

        let mut system = S::init(self).map_err(|source| Error::System {
            system: name,
            phase,
            source,
        })?;

        // `init` has the world and may have registered `S` itself.
        if !self.scheduler.registered.insert(type_id) {
            system.destroy(self);
            return Err(Error::DuplicateSystem(name));
        }

        self.scheduler.phases[phase.slot()].push(SystemRecord {
            type_id,
            name,
            phase,
            system: Box::new(system),
        });
        log::debug!("registered system {} in {:?}", name, phase);
        Ok(())
    }

    /// Destroys and drops system `S`.
    pub fn unregister_system<S>(&mut self) -> Result<()>
    where
        S: System,
    {
        let name = std::any::type_name::<S>();
        let type_id = TypeId::of::<S>();

        if self.running {
            return Err(Error::SchedulerBusy);
        }
        if !self.scheduler.registered.remove(&type_id) {
            return Err(Error::SystemNotRegistered(name));
        }

        if let Some(mut record) = self.scheduler.take(type_id) {
            record.system.destroy(self);
            log::debug!("unregistered system {} from {:?}", name, record.phase);
        }
        Ok(())
    }

    pub fn is_registered<S>(&self) -> bool
    where
        S: System,
    {
        self.scheduler.registered.contains(&TypeId::of::<S>())
    }

    /// Returns the number of registered systems.
    pub fn system_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Runs the `EarlyMainThread`, `MultiThread`, `LateMainThread`
    /// and `RemoveTags` phases in that order.
    ///
    /// The first failing system or job aborts the tick and is returned.
    pub fn tick(&mut self, delta_time: f32) -> Result<()> {
        self.drive(|scheduler, world| {
            Phase::TICK
                .iter()
                .try_for_each(|&phase| scheduler.run_phase(world, phase, delta_time))
        })
    }

    /// Runs the `Physics` phase.
    pub fn physics_tick(&mut self, delta_time: f32) -> Result<()> {
        self.drive(|scheduler, world| scheduler.run_phase(world, Phase::Physics, delta_time))
    }

    /// Calls `System::draw_gizmos` on every system, then runs
    /// the `Gizmos` phase.
    #[cfg(debug_assertions)]
    pub fn gizmos_tick(&mut self) -> Result<()> {
        self.drive(|scheduler, world| {
            scheduler.draw_gizmos(world);
            scheduler.run_phase(world, Phase::Gizmos, 0.0)
        })
    }

    /// Moves the scheduler out of the world for the duration of `f`
    /// so systems can be handed the world itself. The scheduler is
    /// put back even if a system panics.
    fn drive(&mut self, f: impl FnOnce(&mut Scheduler, &mut World) -> Result<()>) -> Result<()> {
        if self.running {
            return Err(Error::SchedulerBusy);
        }

        let mut scheduler = std::mem::take(&mut self.scheduler);
        self.running = true;
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&mut scheduler, &mut *self)));
        self.running = false;
        self.scheduler = scheduler;

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Destroys every system, latest phase first and in reverse
    /// registration order within a phase.
    pub(crate) fn destroy_systems(&mut self) {
        let mut scheduler = std::mem::take(&mut self.scheduler);
        for records in scheduler.phases.iter_mut().rev() {
            while let Some(mut record) = records.pop() {
                record.system.destroy(self);
                log::debug!("destroyed system {}", record.name);
            }
        }
    }
}

/// Removes one-frame marker component `T` from every entity holding
/// it. Register it in `Phase::RemoveTags`.
///
/// Shared tags are removed by dropping ownership.
pub struct RemoveTag<T> {
    group: GroupHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> System for RemoveTag<T>
where
    T: Component,
{
    fn init(world: &mut World) -> std::result::Result<Self, SystemError> {
        if T::STORAGE == StorageKind::Static {
            return Err(format!(
                "static component {} cannot be used as a tag",
                std::any::type_name::<T>()
            )
            .into());
        }

        Ok(Self {
            group: world.filter().with::<T>().group(),
            _marker: PhantomData,
        })
    }

    fn execute(&mut self, ctx: &mut SystemCtx<'_>) -> SystemResult {
        let world = ctx
            .try_world_mut()
            .ok_or_else(|| SystemError::from("tags can only be removed with exclusive world access"))?;

        for entity in self.group.entities() {
            if T::STORAGE == StorageKind::Shared {
                world.remove_owner::<T>(entity)?;
            } else {
                world.remove::<T>(entity)?;
            }
        }
        Ok(None)
    }
}
