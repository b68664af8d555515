//! Fixed-size worker pool over a bounded FIFO queue of thunks.
//!
//! The pool is the execution substrate of the executor: uniformly-typed
//! thunks go in, long-lived worker threads run them to completion. Thunks
//! arrive in FIFO order; ordering between parallel workers is unspecified.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use thiserror::Error;

/// Unit of work executed by a pool worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when pushing onto a stopped pool.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("worker pool is stopped")]
pub struct PoolStopped;

/// Fixed-size pool of long-lived worker threads over a bounded queue.
///
/// [`push`](Self::push) blocks the caller while the queue is full. The
/// executor's dispatch is naturally throttled by the DAG's ready front, so
/// the capacity only needs to hold the widest front of simultaneously-ready
/// nodes.
///
/// A thunk that panics is logged and swallowed; it never takes a worker
/// thread down.
#[must_use]
#[derive(Debug)]
pub struct WorkerPool {
    queue: Option<Sender<Job>>,
    discard: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads (at least one) over a queue holding up to
    /// `queue_capacity` thunks.
    ///
    /// # Panics
    /// If the operating system refuses to spawn a thread.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (queue, jobs) = bounded::<Job>(queue_capacity.max(1));
        let discard = Arc::new(AtomicBool::new(false));
        let workers = (0..workers.max(1))
            .map(|index| {
                let jobs = jobs.clone();
                let discard = Arc::clone(&discard);
                thread::Builder::new()
                    .name(format!("dagex-worker-{index}"))
                    .spawn(move || worker_loop(&jobs, &discard))
                    .expect("WorkerPool::new: failed to spawn worker thread")
            })
            .collect();
        Self {
            queue: Some(queue),
            discard,
            workers,
        }
    }

    /// Enqueue a thunk, waking at most one idle worker.
    ///
    /// Blocks while the queue is full.
    ///
    /// # Errors
    /// [`PoolStopped`] if [`stop`](Self::stop) was already called.
    pub fn push(&self, job: Job) -> Result<(), PoolStopped> {
        let Some(queue) = &self.queue else {
            return Err(PoolStopped);
        };
        queue.send(job).map_err(|_| PoolStopped)
    }

    /// Clone of the queue's sending side, used by in-flight thunks to
    /// enqueue more work. `None` once the pool is stopped.
    pub(crate) fn sender(&self) -> Option<Sender<Job>> {
        self.queue.clone()
    }

    /// Stop the pool and join all worker threads.
    ///
    /// With `drain = true`, every thunk still queued runs to completion
    /// first. With `drain = false`, workers drop the remaining queue
    /// unexecuted, releasing the thunks' resources.
    ///
    /// Idempotent; dropping the pool is `stop(true)`.
    pub fn stop(&mut self, drain: bool) {
        if !drain {
            self.discard.store(true, Ordering::Release);
        }
        drop(self.queue.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn worker_loop(jobs: &Receiver<Job>, discard: &AtomicBool) {
    while let Ok(job) = jobs.recv() {
        if discard.load(Ordering::Acquire) {
            // Surplus thunk after `stop(false)`.
            drop(job);
            continue;
        }
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("worker caught a panicking thunk");
        }
    }
}
