mod dispatch;
mod traverse;

pub(crate) use crate::executor::dispatch::ExecCtx;

use crate::{
    config::Options,
    node::{GraphNode, NodeHandle},
    pool::WorkerPool,
    task::{TaskArgs, TaskFn},
    types::TopologyStamp,
};
use core::cell::Cell;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by `Executor::execute` when the graph cannot be run as
/// wired.
///
/// The graph is left untouched; fixing the condition (breaking the cycle,
/// calling `reset`) makes it runnable again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecuteError {
    /// The wired edge set contains a directed cycle.
    #[error("graph contains cycle(s)")]
    Cycle,
    /// The graph already executed; counters and argument storage are stale.
    #[error("graph already executed; call `reset` before executing again")]
    NotReset,
}

/// DAG executor: owns the nodes, validates acyclicity, and runs one pass
/// over the graph per call.
///
/// Key responsibilities:
/// - Allocates nodes from callables via [`make_node`](Self::make_node) and
///   keeps them in stable storage for the executor's whole lifetime.
/// - Detects cycles with a tricolor depth-first search, memoized against a
///   topology stamp so an unchanged graph is never re-scanned.
/// - Discovers roots as the nodes whose pending counter is zero at
///   [`execute`](Self::execute) time, dispatches them onto the worker pool,
///   and lets completing parents wake their children directly.
/// - Blocks until every node reachable from the initial ready set has
///   signaled completion, then returns.
#[must_use]
#[derive(Debug)]
pub struct Executor {
    nodes: Vec<Arc<dyn GraphNode>>,
    pool: WorkerPool,
    stamp: Arc<TopologyStamp>,
    cycle_cache: Cell<Option<bool>>,
    executed: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Executor {
    /// Build an executor and spawn its worker pool.
    pub fn new(options: Options) -> Self {
        Self {
            nodes: Vec::new(),
            pool: WorkerPool::new(options.workers, options.queue_capacity),
            stamp: Arc::new(TopologyStamp::default()),
            cycle_cache: Cell::new(None),
            executed: false,
        }
    }

    /// Allocate a node from `task` under an auto-generated name.
    ///
    /// The callable's arity and result type are captured statically; see
    /// [`TaskFn`] for what qualifies. The returned handle wires edges,
    /// feeds arguments, and collects the result; the node itself lives in
    /// the executor.
    pub fn make_node<A, R, F>(&mut self, task: F) -> NodeHandle<A, R>
    where
        A: TaskArgs,
        R: Send + 'static,
        F: TaskFn<A, R>,
    {
        let name = format!("node-{}", self.nodes.len());
        self.make_named_node(name, task)
    }

    /// Allocate a node from `task` under an explicit name.
    ///
    /// The name shows up in logs, wiring errors, and poison values, which
    /// makes failures in larger graphs attributable.
    pub fn make_named_node<A, R, F>(
        &mut self,
        name: impl Into<String>,
        mut task: F,
    ) -> NodeHandle<A, R>
    where
        A: TaskArgs,
        R: Send + 'static,
        F: TaskFn<A, R>,
    {
        let handle = NodeHandle::new(
            self.nodes.len(),
            name.into().into(),
            Arc::clone(&self.stamp),
            Box::new(move |args: A| task.invoke(args)),
        );
        self.nodes.push(handle.as_graph_node());
        self.stamp.mark_dirty();
        handle
    }

    /// Number of nodes owned by this executor.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True iff the wired edge set contains a directed cycle.
    ///
    /// Runs a tricolor depth-first search from every node; memoized, so
    /// repeated queries on an unchanged graph are free.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        let changed = self.stamp.take_dirty();
        if !changed {
            if let Some(cached) = self.cycle_cache.get() {
                return cached;
            }
        }
        let result = traverse::has_cycle(&self.nodes);
        self.cycle_cache.set(Some(result));
        result
    }

    /// Run one full pass over the graph.
    ///
    /// The initial ready set is every node whose pending counter is zero at
    /// the moment of the call: nodes without inputs, and nodes whose every
    /// slot was fed. Each completing node delivers its result downstream
    /// and enqueues any child whose last input just arrived; the call
    /// returns once every node reachable from the ready set has completed.
    ///
    /// Every argument slot of every reachable node must have a producer (a
    /// parent edge or a prior [`feed`](NodeHandle::feed)); a reachable node
    /// with an unsatisfiable slot never becomes ready and this call never
    /// returns.
    ///
    /// A failing task does not abort the pass: its descendants complete
    /// carrying the failure, which [`NodeHandle::collect`] then reports.
    ///
    /// There is no implicit [`reset`](Self::reset).
    ///
    /// # Errors
    /// - [`ExecuteError::Cycle`] if the wired graph is cyclic.
    /// - [`ExecuteError::NotReset`] on a repeated call without `reset`.
    pub fn execute(&mut self) -> Result<(), ExecuteError> {
        if self.executed {
            return Err(ExecuteError::NotReset);
        }
        if self.has_cycle() {
            return Err(ExecuteError::Cycle);
        }
        self.executed = true;

        let ready: Vec<Arc<dyn GraphNode>> = self
            .nodes
            .iter()
            .filter(|node| node.pending() == 0)
            .cloned()
            .collect();
        let total = traverse::reachable_count(&ready);
        tracing::debug!(
            roots = ready.len(),
            reachable = total,
            nodes = self.nodes.len(),
            "dispatching graph",
        );
        if total == 0 {
            return Ok(());
        }

        let queue = self.pool.sender().expect("Executor::execute: [1]");
        let ctx = Arc::new(ExecCtx::new(queue, total));
        for node in ready {
            ExecCtx::dispatch(&ctx, node);
        }
        ctx.wait_all_done();
        tracing::debug!(completed = total, "graph execution finished");
        Ok(())
    }

    /// Return every node to its initial pending counter, clear argument
    /// storage, fed slots, poison, and results — enabling another
    /// [`execute`](Self::execute).
    pub fn reset(&mut self) {
        for node in &self.nodes {
            node.reset();
        }
        self.executed = false;
    }
}
