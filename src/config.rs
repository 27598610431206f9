/// Runtime options for a `World`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads for parallel jobs.
    /// Zero shares rayon's global pool instead of building one.
    pub worker_threads: usize,
    /// Prefix for worker thread names; workers are suffixed with their index.
    pub thread_name: String,
    /// Number of entity indices reserved up front.
    pub initial_entity_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: String::from("phecs-worker"),
            initial_entity_capacity: 0,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_initial_entity_capacity(mut self, capacity: usize) -> Self {
        self.initial_entity_capacity = capacity;
        self
    }
}
