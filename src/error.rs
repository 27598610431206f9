use crate::component::StorageKind;
use crate::entity::Entity;
use crate::system::Phase;

/// Error type returned from a system's `init` or `execute`.
///
/// Any error type can be propagated out of a system with `?`.
pub type SystemError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entity {0} is not alive")]
    DeadEntity(Entity),

    #[error("component {component} uses {actual} storage, not {expected}")]
    StorageKind {
        component: &'static str,
        expected: StorageKind,
        actual: StorageKind,
    },

    #[error("system {0} is already registered")]
    DuplicateSystem(&'static str),

    #[error("system {0} is not registered")]
    SystemNotRegistered(&'static str),

    #[error("systems cannot be registered or unregistered while a tick is running")]
    SchedulerBusy,

    #[error("system {system} failed during {phase:?}")]
    System {
        system: &'static str,
        phase: Phase,
        #[source]
        source: SystemError,
    },

    #[error("a job scheduled during {phase:?} failed: {message}")]
    Job { phase: Phase, message: String },

    #[error("job panicked: {0}")]
    JobPanicked(String),

    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
