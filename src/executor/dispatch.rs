use crate::{node::GraphNode, pool::Job};
use crossbeam_channel::Sender;
use std::sync::{Arc, Condvar, Mutex};

/// Shared context of one `execute` pass: the pool's push surface plus
/// completion accounting.
///
/// Every dispatched thunk carries an `Arc` of this; the main thread parks
/// on the condition variable until the completion counter reaches the
/// number of reachable nodes.
#[derive(Debug)]
pub(crate) struct ExecCtx {
    queue: Sender<Job>,
    /// Number of nodes reachable from the initial ready set.
    total: usize,
    done: Mutex<usize>,
    all_done: Condvar,
}

impl ExecCtx {
    pub(crate) fn new(queue: Sender<Job>, total: usize) -> Self {
        Self {
            queue,
            total,
            done: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    /// Enqueue a ready node's thunk on the worker pool.
    ///
    /// Called for roots by `execute` and for children by the delivery that
    /// landed their pending counter on zero. The executor never pushes
    /// after stopping its pool, so a closed queue here is a programming
    /// error.
    pub(crate) fn dispatch(ctx: &Arc<Self>, node: Arc<dyn GraphNode>) {
        tracing::trace!(node = node.name(), "dispatching ready node");
        let job_ctx = Arc::clone(ctx);
        ctx.queue
            .send(Box::new(move || node.run(&job_ctx)))
            .expect("ExecCtx::dispatch: push on a stopped worker pool");
    }

    /// Record one node completion; the last one wakes the awaiting thread.
    pub(crate) fn complete_one(&self) {
        let mut done = self.done.lock().expect("ExecCtx::complete_one: [1]");
        *done += 1;
        if *done == self.total {
            self.all_done.notify_all();
        }
    }

    /// Block until every reachable node has signaled completion.
    pub(crate) fn wait_all_done(&self) {
        let done = self.done.lock().expect("ExecCtx::wait_all_done: [1]");
        let _done = self
            .all_done
            .wait_while(done, |done| *done < self.total)
            .expect("ExecCtx::wait_all_done: [2]");
    }
}
