//! Parallel jobs and the handles used to order them.
//!
//! A `JobHandle` stands for work that may still be running. Handles
//! can be combined into one that completes when all of its inputs
//! have, and a job can be scheduled to start only after a handle
//! completes. Panics inside a job are caught at the job boundary and
//! carried by the handle, so they surface wherever the handle is
//! joined instead of tearing down a worker.

use crate::component::Component;
use crate::config::Config;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::storage::Column;
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Continuation = Box<dyn FnOnce(Option<&str>) + Send>;

#[derive(Default)]
struct LatchState {
    done: bool,
    failure: Option<String>,
    continuations: Vec<Continuation>,
}

/// One-shot completion flag with a failure message and
/// callbacks to run on completion.
#[derive(Default)]
struct Latch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl Latch {
    fn set(&self, failure: Option<String>) {
        let continuations = {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.done = true;
            state.failure = failure.clone();
            self.cond.notify_all();
            std::mem::take(&mut state.continuations)
        };

        for continuation in continuations {
            continuation(failure.as_deref());
        }
    }

    /// Runs `f` once the latch is set, immediately if it already is.
    fn on_complete(&self, f: Continuation) {
        let mut state = self.state.lock();
        if state.done {
            let failure = state.failure.clone();
            drop(state);
            f(failure.as_deref());
        } else {
            state.continuations.push(f);
        }
    }

    fn wait(&self) -> Option<String> {
        let mut state = self.state.lock();
        while !state.done {
            self.cond.wait(&mut state);
        }
        state.failure.clone()
    }

    fn is_set(&self) -> bool {
        self.state.lock().done
    }
}

/// A handle to in-flight parallel work.
#[derive(Clone)]
pub struct JobHandle {
    latch: Arc<Latch>,
}

impl JobHandle {
    /// Returns a handle which is already complete.
    pub fn completed() -> Self {
        let handle = Self::pending();
        handle.latch.set(None);
        handle
    }

    pub(crate) fn pending() -> Self {
        Self {
            latch: Arc::new(Latch::default()),
        }
    }

    pub(crate) fn finish(&self, failure: Option<String>) {
        self.latch.set(failure);
    }

    pub fn is_completed(&self) -> bool {
        self.latch.is_set()
    }

    /// Blocks until the work completes.
    ///
    /// Returns `Error::JobPanicked` if the job, or any job
    /// it depended on, panicked.
    pub fn complete(&self) -> Result<()> {
        match self.latch.wait() {
            None => Ok(()),
            Some(message) => Err(Error::JobPanicked(message)),
        }
    }

    /// Returns a handle which completes once every handle in
    /// `handles` has. The first failure observed is carried over.
    pub fn combine(handles: impl IntoIterator<Item = JobHandle>) -> JobHandle {
        let mut handles: Vec<_> = handles.into_iter().collect();
        match handles.len() {
            0 => return JobHandle::completed(),
            1 => return handles.remove(0),
            _ => (),
        }

        struct Countdown {
            remaining: AtomicUsize,
            failure: Mutex<Option<String>>,
            combined: JobHandle,
        }

        let countdown = Arc::new(Countdown {
            remaining: AtomicUsize::new(handles.len()),
            failure: Mutex::new(None),
            combined: JobHandle::pending(),
        });

        for handle in &handles {
            let countdown = Arc::clone(&countdown);
            handle.latch.on_complete(Box::new(move |failure| {
                if let Some(message) = failure {
                    countdown
                        .failure
                        .lock()
                        .get_or_insert_with(|| message.to_owned());
                }
                if countdown.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let failure = countdown.failure.lock().take();
                    countdown.combined.finish(failure);
                }
            }));
        }

        countdown.combined.clone()
    }
}

impl Debug for JobHandle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Schedules jobs onto a rayon thread pool.
///
/// Cloning yields another handle onto the same pool.
#[derive(Clone, Default)]
pub struct JobSystem {
    /// `None` shares rayon's global pool.
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl JobSystem {
    /// Uses rayon's global thread pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Builds a dedicated pool as configured, or shares the
    /// global pool if `config.worker_threads` is zero.
    pub fn new(config: &Config) -> Result<Self> {
        if config.worker_threads == 0 {
            return Ok(Self::global());
        }

        let prefix = config.thread_name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .build()?;
        log::debug!("started {} worker threads", config.worker_threads);

        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn worker_count(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn spawn_raw(&self, f: impl FnOnce() + Send + 'static) {
        match &self.pool {
            Some(pool) => pool.spawn(f),
            None => rayon::spawn(f),
        }
    }

    /// Runs `job` on a worker.
    pub fn schedule<F>(&self, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = JobHandle::pending();
        let done = handle.clone();
        self.spawn_raw(move || run(job, &done));
        handle
    }

    /// Runs `job` on a worker once `dependency` completes.
    ///
    /// If the dependency failed, `job` never runs and the
    /// returned handle carries the failure.
    pub fn schedule_after<F>(&self, dependency: &JobHandle, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = JobHandle::pending();
        let done = handle.clone();
        let jobs = self.clone();
        dependency
            .latch
            .on_complete(Box::new(move |failure| match failure {
                Some(message) => done.finish(Some(format!("dependency failed: {}", message))),
                None => jobs.spawn_raw(move || run(job, &done)),
            }));
        handle
    }

    /// Splits the values of `column` into `chunks` contiguous slices
    /// of near-equal length and runs `f` on each slice in parallel.
    ///
    /// Slices never overlap and together cover the whole storage.
    pub fn for_each_chunk<T, F>(&self, column: &Column<T>, chunks: usize, f: F) -> JobHandle
    where
        T: Component,
        F: Fn(&[Entity], &mut [T]) + Send + Sync + 'static,
    {
        let column = column.clone();
        self.schedule(move || {
            let mut storage = column.borrow_mut();
            let (entities, values) = storage.split_mut();
            if values.is_empty() {
                return;
            }

            let chunks = chunks.max(1);
            let chunk_len = (values.len() + chunks - 1) / chunks;
            entities
                .par_chunks(chunk_len)
                .zip(values.par_chunks_mut(chunk_len))
                .for_each(|(entities, values)| f(entities, values));
        })
    }

    /// Runs `f` in parallel on the value of `T` of every
    /// member of `group`.
    pub fn for_each_member<T, F>(&self, group: &GroupHandle, column: &Column<T>, f: F) -> JobHandle
    where
        T: Component,
        F: Fn(Entity, &mut T) + Send + Sync + 'static,
    {
        let group = group.clone();
        let column = column.clone();
        self.schedule(move || {
            let members = group.members();
            let mut storage = column.borrow_mut();
            let (entities, values) = storage.split_mut();
            entities
                .par_iter()
                .zip(values.par_iter_mut())
                .filter(|(entity, _)| members.contains(**entity))
                .for_each(|(entity, value)| f(*entity, value));
        })
    }
}

impl Debug for JobSystem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("JobSystem")
            .field("dedicated", &self.pool.is_some())
            .field("workers", &self.worker_count())
            .finish()
    }
}

fn run(job: impl FnOnce(), done: &JobHandle) {
    let failure = panic::catch_unwind(AssertUnwindSafe(job))
        .err()
        .map(panic_message);
    if let Some(message) = &failure {
        log::error!("job panicked: {}", message);
    }
    done.finish(failure);
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn combine_waits_for_all() {
        let jobs = JobSystem::global();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                jobs.schedule(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        JobHandle::combine(handles).complete().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn combine_of_nothing_is_complete() {
        assert!(JobHandle::combine(Vec::new()).is_completed());
    }

    #[test]
    fn panic_is_carried_by_handle() {
        let jobs = JobSystem::global();
        let handle = jobs.schedule(|| panic!("boom"));

        match handle.complete() {
            Err(Error::JobPanicked(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }

        let combined = JobHandle::combine(vec![handle, JobHandle::completed()]);
        assert!(combined.complete().is_err());
    }

    #[test]
    fn schedule_after_orders_jobs() {
        let jobs = JobSystem::global();
        let first_done = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(AtomicBool::new(false));

        let first = {
            let first_done = Arc::clone(&first_done);
            jobs.schedule(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                first_done.store(true, Ordering::SeqCst);
            })
        };
        let second = {
            let first_done = Arc::clone(&first_done);
            let observed = Arc::clone(&observed);
            jobs.schedule_after(&first, move || {
                observed.store(first_done.load(Ordering::SeqCst), Ordering::SeqCst);
            })
        };

        second.complete().unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_dependency_skips_job() {
        let jobs = JobSystem::global();
        let ran = Arc::new(AtomicBool::new(false));

        let failing = jobs.schedule(|| panic!("first"));
        let dependent = {
            let ran = Arc::clone(&ran);
            jobs.schedule_after(&failing, move || ran.store(true, Ordering::SeqCst))
        };

        assert!(dependent.complete().is_err());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn dedicated_pool() {
        let jobs = JobSystem::new(&Config::new().with_worker_threads(3)).unwrap();
        assert_eq!(jobs.worker_count(), 3);
        jobs.schedule(|| ()).complete().unwrap();
    }
}
