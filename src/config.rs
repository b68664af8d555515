/// Construction-time options for [`Executor`](crate::executor::Executor).
///
/// The defaults give a sequential executor: a single worker thread over a
/// queue of 100 thunks, so execution order is the dependency order with no
/// interleaving.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Number of worker threads in the pool. Clamped to at least one.
    pub workers: usize,
    /// Bounded capacity of the pool's thunk queue. Enqueueing blocks while
    /// the queue is full, so the capacity must be able to hold the widest
    /// front of simultaneously-ready nodes.
    pub queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 100,
        }
    }
}

impl Options {
    /// Options with the given worker count and the default queue capacity.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }
}
