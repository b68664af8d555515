//! Typed task nodes: argument storage, dependency wiring, execution, and
//! result retrieval.
//!
//! A node owns a callable, a partially-filled argument tuple, an optional
//! result slot, and an atomic pending-input counter. Parents deposit their
//! results into child argument slots through delivery thunks registered at
//! wiring time; the parent that lands the counter on zero enqueues the child
//! on the worker pool. Task failures become [`TaskError`] poison values that
//! flow along the same edges, so execution always terminates.

use crate::{
    executor::ExecCtx,
    task::{SlotAt, TaskArgs},
    types::{NodeId, TopologyStamp},
    utils::panic_message,
};
use core::sync::atomic::{AtomicUsize, Ordering};
use derive_more::Debug;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, Weak},
};
use thiserror::Error;

/// Error produced by a wiring operation that would violate a graph
/// invariant.
///
/// The failed call leaves the graph in its prior valid state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// A second value-carrying child was wired to a parent that moves its
    /// result.
    #[error("node `{parent}` already moves its result to a child")]
    FanOutViolation {
        /// Name of the parent whose fan-out limit was hit.
        parent: Arc<str>,
    },
    /// A move-delivery edge and `mark_as_output` were requested on the same
    /// parent, in either order.
    #[error("node `{parent}` cannot both move its result to a child and keep it for collection")]
    OutputConflict {
        /// Name of the parent with the conflicting requests.
        parent: Arc<str>,
    },
    /// The argument slot already has a producer: it is wired to a parent or
    /// was already fed in the current cycle.
    #[error("slot {slot} of node `{node}` already has a producer")]
    SlotConflict {
        /// Name of the node whose slot was claimed twice.
        node: Arc<str>,
        /// Argument position of the collision.
        slot: usize,
    },
}

/// Error returned by [`NodeHandle::collect`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectError {
    /// The node holds no result: the graph has not executed yet, the result
    /// was moved to a child, or it was already collected.
    #[error("no result found in node")]
    NoResult,
    /// The node's task, or the task of an ancestor, failed.
    #[error(transparent)]
    Failed(#[from] TaskError),
}

/// Poison value describing a failed task.
///
/// Produced when a task panics; delivered to descendants in place of the
/// result, so the whole downstream subgraph completes carrying the error of
/// the node that originally failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("task `{node}` panicked: {message}")]
pub struct TaskError {
    node: Arc<str>,
    message: Arc<str>,
}

impl TaskError {
    fn new(node: Arc<str>, message: impl Into<Arc<str>>) -> Self {
        Self {
            node,
            message: message.into(),
        }
    }

    /// Name of the node whose task originally failed.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.node
    }
}

pub(crate) type TaskOutcome<R> = Result<R, TaskError>;

/// Executor-visible face of a typed node.
///
/// The typed payload stays behind this shell; scheduling only needs to run,
/// reset, and walk nodes.
pub(crate) trait GraphNode: core::fmt::Debug + Send + Sync {
    fn run(self: Arc<Self>, ctx: &Arc<ExecCtx>);
    fn reset(&self);
    fn pending(&self) -> usize;
    fn id(&self) -> NodeId;
    fn name(&self) -> &str;
    fn downstream(&self) -> Vec<Arc<dyn GraphNode>>;
}

enum ValueDeliver<R> {
    /// Clone the outcome into the child's slot; unlimited fan-out.
    Clone(Box<dyn Fn(&Arc<ExecCtx>, &TaskOutcome<R>) + Send>),
    /// Move the outcome into the sole consumer's slot.
    Move(Box<dyn Fn(&Arc<ExecCtx>, TaskOutcome<R>) + Send>),
}

/// Value-carrying downstream edge: a delivery thunk plus the child it
/// feeds.
pub struct ValueSink<R> {
    deliver: ValueDeliver<R>,
    target: Weak<dyn GraphNode>,
}

/// Ordering-only downstream edge: no data, but a failed parent still
/// poisons the child.
pub struct OrderSink {
    deliver: Box<dyn Fn(&Arc<ExecCtx>, Option<&TaskError>) + Send>,
    target: Weak<dyn GraphNode>,
}

mod private {
    pub trait Sealed {}
}

/// A handle able to act as the parent of a data edge producing `R`.
///
/// Implemented by every [`NodeHandle`] whose result type is `R`, whatever
/// the node's argument tuple, so `child.set_parent::<SLOT>(&parent)` never
/// needs to name the parent's own signature.
pub trait Source<R>: private::Sealed {
    #[doc(hidden)]
    fn wire_value(&self, sink: ValueSink<R>) -> Result<(), WireError>;
}

#[derive(Debug)]
struct NodeCore {
    id: NodeId,
    name: Arc<str>,
    /// Unsatisfied inputs; the node is ready at zero.
    pending: AtomicUsize,
    /// Value `pending` is restored to by `reset`: argument arity plus the
    /// number of ordering-only parents.
    parent_target: AtomicUsize,
    stamp: Arc<TopologyStamp>,
}

struct InputState<A: TaskArgs> {
    args: A::Partial,
    /// Slots wired to a parent; persists across cycles.
    wired: u32,
    /// Slots filled by `feed` in the current cycle.
    fed: u32,
    poison: Option<TaskError>,
}

struct OutputState<R> {
    result: Option<TaskOutcome<R>>,
    /// Result must stay retrievable after execution.
    output: bool,
    value_sinks: Vec<ValueSink<R>>,
    order_sinks: Vec<OrderSink>,
}

#[derive(Debug)]
pub(crate) struct TaskNode<A: TaskArgs, R: Send + 'static> {
    core: NodeCore,
    #[debug(skip)]
    task: Mutex<Box<dyn FnMut(A) -> R + Send>>,
    #[debug(skip)]
    inputs: Mutex<InputState<A>>,
    #[debug(skip)]
    outputs: Mutex<OutputState<R>>,
}

/// Cloneable typed handle to a node owned by an executor.
///
/// `A` is the task's argument tuple, `R` its result type. All wiring and
/// retrieval goes through handles; the executor only schedules.
#[must_use]
pub struct NodeHandle<A: TaskArgs, R: Send + 'static> {
    node: Arc<TaskNode<A, R>>,
}

impl<A: TaskArgs, R: Send + 'static> Clone for NodeHandle<A, R> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A: TaskArgs, R: Send + 'static> core::fmt::Debug for NodeHandle<A, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("NodeHandle").field(&self.node.core).finish()
    }
}

impl<A: TaskArgs, R: Send + 'static> private::Sealed for NodeHandle<A, R> {}

impl<A: TaskArgs, R: Send + 'static> Source<R> for NodeHandle<A, R> {
    fn wire_value(&self, sink: ValueSink<R>) -> Result<(), WireError> {
        self.node.add_value_sink(sink)
    }
}

impl<A: TaskArgs, R: Send + 'static> NodeHandle<A, R> {
    pub(crate) fn new(
        id: NodeId,
        name: Arc<str>,
        stamp: Arc<TopologyStamp>,
        task: Box<dyn FnMut(A) -> R + Send>,
    ) -> Self {
        let node = Arc::new(TaskNode {
            core: NodeCore {
                id,
                name,
                pending: AtomicUsize::new(A::ARITY),
                parent_target: AtomicUsize::new(A::ARITY),
                stamp,
            },
            task: Mutex::new(task),
            inputs: Mutex::new(InputState {
                args: A::Partial::default(),
                wired: 0,
                fed: 0,
                poison: None,
            }),
            outputs: Mutex::new(OutputState {
                result: None,
                output: false,
                value_sinks: Vec::new(),
                order_sinks: Vec::new(),
            }),
        });
        Self { node }
    }

    pub(crate) fn as_graph_node(&self) -> Arc<dyn GraphNode> {
        self.node.clone()
    }

    /// Name the node was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node.core.name
    }

    /// Wire a data edge: `parent`'s result is cloned into argument slot
    /// `SLOT` of this node when the parent completes.
    ///
    /// The slot was already counted in the node's initial pending count, so
    /// this does not touch the counter. Any number of clone-delivery
    /// children may share one parent, and the parent keeps its own copy of
    /// the result for [`collect`](Self::collect).
    ///
    /// For result types that cannot (or should not) be cloned, see
    /// [`set_parent_move`](Self::set_parent_move).
    ///
    /// # Errors
    /// - [`WireError::SlotConflict`] if the slot already has a producer.
    /// - [`WireError::FanOutViolation`] if the parent already moves its
    ///   result to a child.
    pub fn set_parent<const SLOT: usize>(
        &self,
        parent: &impl Source<<A as SlotAt<SLOT>>::Value>,
    ) -> Result<(), WireError>
    where
        A: SlotAt<SLOT>,
        <A as SlotAt<SLOT>>::Value: Clone,
    {
        let mut inputs = self.node.inputs.lock().expect("NodeHandle::set_parent: [1]");
        self.node.claim_slot::<SLOT>(&inputs)?;
        let child = Arc::downgrade(&self.node);
        let deliver = ValueDeliver::Clone(Box::new(
            move |ctx: &Arc<ExecCtx>, outcome: &TaskOutcome<<A as SlotAt<SLOT>>::Value>| {
                let Some(child) = child.upgrade() else { return };
                match outcome {
                    Ok(value) => child.put_slot::<SLOT>(value.clone()),
                    Err(err) => child.poison(err.clone()),
                }
                child.arrive(ctx);
            },
        ));
        let target: Weak<dyn GraphNode> = Arc::downgrade(&(self.node.clone() as Arc<dyn GraphNode>));
        parent.wire_value(ValueSink { deliver, target })?;
        inputs.wired |= 1 << SLOT;
        Ok(())
    }

    /// Wire a data edge that **moves** `parent`'s result into argument slot
    /// `SLOT` of this node.
    ///
    /// Works for any result type, including move-only ones. The parent's
    /// stored result is cleared after the handoff, so the parent's
    /// [`collect`](Self::collect) reports [`CollectError::NoResult`]; at
    /// most one move-delivery child may exist, and it may not coexist with
    /// any other value-carrying child or with `mark_as_output`.
    ///
    /// # Errors
    /// - [`WireError::SlotConflict`] if the slot already has a producer.
    /// - [`WireError::FanOutViolation`] if the parent already has a
    ///   value-carrying child.
    /// - [`WireError::OutputConflict`] if the parent is marked as output.
    pub fn set_parent_move<const SLOT: usize>(
        &self,
        parent: &impl Source<<A as SlotAt<SLOT>>::Value>,
    ) -> Result<(), WireError>
    where
        A: SlotAt<SLOT>,
    {
        let mut inputs = self
            .node
            .inputs
            .lock()
            .expect("NodeHandle::set_parent_move: [1]");
        self.node.claim_slot::<SLOT>(&inputs)?;
        let child = Arc::downgrade(&self.node);
        let deliver = ValueDeliver::Move(Box::new(
            move |ctx: &Arc<ExecCtx>, outcome: TaskOutcome<<A as SlotAt<SLOT>>::Value>| {
                let Some(child) = child.upgrade() else { return };
                match outcome {
                    Ok(value) => child.put_slot::<SLOT>(value),
                    Err(err) => child.poison(err),
                }
                child.arrive(ctx);
            },
        ));
        let target: Weak<dyn GraphNode> = Arc::downgrade(&(self.node.clone() as Arc<dyn GraphNode>));
        parent.wire_value(ValueSink { deliver, target })?;
        inputs.wired |= 1 << SLOT;
        Ok(())
    }

    /// Wire an ordering edge: this node may not start before `parent`
    /// finishes. No data is carried, but a failed parent still poisons this
    /// node.
    ///
    /// Increments the pending counter: unlike a data edge, an ordering
    /// parent is not pre-counted by any argument slot.
    pub fn after<PA, PR>(&self, parent: &NodeHandle<PA, PR>)
    where
        PA: TaskArgs,
        PR: Send + 'static,
    {
        let child = Arc::downgrade(&self.node);
        let deliver = Box::new(move |ctx: &Arc<ExecCtx>, err: Option<&TaskError>| {
            let Some(child) = child.upgrade() else { return };
            if let Some(err) = err {
                child.poison(err.clone());
            }
            child.arrive(ctx);
        });
        let target: Weak<dyn GraphNode> = Arc::downgrade(&(self.node.clone() as Arc<dyn GraphNode>));
        self.node.core.parent_target.fetch_add(1, Ordering::AcqRel);
        self.node.core.pending.fetch_add(1, Ordering::AcqRel);
        parent.node.add_order_sink(OrderSink { deliver, target });
    }

    /// Inject an argument manually, as if an invisible parent delivered
    /// `value` to slot `SLOT`.
    ///
    /// Decrements the pending counter; the node becomes ready when the
    /// counter hits zero, exactly as with a real parent. `reset` clears fed
    /// slots, so repeated cycles feed again.
    ///
    /// # Errors
    /// [`WireError::SlotConflict`] if the slot is wired to a parent or was
    /// already fed in this cycle.
    pub fn feed<const SLOT: usize>(
        &self,
        value: <A as SlotAt<SLOT>>::Value,
    ) -> Result<(), WireError>
    where
        A: SlotAt<SLOT>,
    {
        let mut inputs = self.node.inputs.lock().expect("NodeHandle::feed: [1]");
        self.node.claim_slot::<SLOT>(&inputs)?;
        <A as SlotAt<SLOT>>::store(&mut inputs.args, value);
        inputs.fed |= 1 << SLOT;
        drop(inputs);
        self.node.core.pending.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Retrieve the node's result, taking it out of the node.
    ///
    /// # Errors
    /// - [`CollectError::NoResult`] if the node holds no result: the graph
    ///   has not executed yet, the result was moved to a child, or it was
    ///   already collected.
    /// - [`CollectError::Failed`] if the node's task, or the task of an
    ///   ancestor, failed.
    pub fn collect(&self) -> Result<R, CollectError> {
        let mut outputs = self.node.outputs.lock().expect("NodeHandle::collect: [1]");
        match outputs.result.take() {
            None => Err(CollectError::NoResult),
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(CollectError::Failed(err)),
        }
    }

    /// Force preservation of the result for retrieval after execution.
    ///
    /// Clone-delivery parents keep their result anyway; the marker exists to
    /// rule out the one configuration that would discard it — a
    /// move-delivery child.
    ///
    /// # Errors
    /// [`WireError::OutputConflict`] if a move-delivery child is already
    /// wired.
    pub fn mark_as_output(&self) -> Result<(), WireError> {
        let mut outputs = self
            .node
            .outputs
            .lock()
            .expect("NodeHandle::mark_as_output: [1]");
        if outputs
            .value_sinks
            .iter()
            .any(|sink| matches!(sink.deliver, ValueDeliver::Move(_)))
        {
            return Err(WireError::OutputConflict {
                parent: self.node.core.name.clone(),
            });
        }
        outputs.output = true;
        Ok(())
    }
}

impl<A: TaskArgs, R: Send + 'static> TaskNode<A, R> {
    /// Reject a second producer for one argument slot: the slot was counted
    /// once in the pending counter, so a duplicate would dispatch the node
    /// before all true inputs arrived.
    fn claim_slot<const SLOT: usize>(&self, inputs: &InputState<A>) -> Result<(), WireError>
    where
        A: SlotAt<SLOT>,
    {
        let bit = 1u32 << SLOT;
        if inputs.wired & bit != 0 || inputs.fed & bit != 0 {
            return Err(WireError::SlotConflict {
                node: self.core.name.clone(),
                slot: SLOT,
            });
        }
        Ok(())
    }

    fn add_value_sink(&self, sink: ValueSink<R>) -> Result<(), WireError> {
        let mut outputs = self.outputs.lock().expect("TaskNode::add_value_sink: [1]");
        let move_requested = matches!(sink.deliver, ValueDeliver::Move(_));
        let has_move = outputs
            .value_sinks
            .iter()
            .any(|sink| matches!(sink.deliver, ValueDeliver::Move(_)));
        if has_move || (move_requested && !outputs.value_sinks.is_empty()) {
            return Err(WireError::FanOutViolation {
                parent: self.core.name.clone(),
            });
        }
        if move_requested && outputs.output {
            return Err(WireError::OutputConflict {
                parent: self.core.name.clone(),
            });
        }
        outputs.value_sinks.push(sink);
        self.core.stamp.mark_dirty();
        Ok(())
    }

    fn add_order_sink(&self, sink: OrderSink) {
        let mut outputs = self.outputs.lock().expect("TaskNode::add_order_sink: [1]");
        outputs.order_sinks.push(sink);
        self.core.stamp.mark_dirty();
    }

    fn put_slot<const SLOT: usize>(&self, value: <A as SlotAt<SLOT>>::Value)
    where
        A: SlotAt<SLOT>,
    {
        let mut inputs = self.inputs.lock().expect("TaskNode::put_slot: [1]");
        <A as SlotAt<SLOT>>::store(&mut inputs.args, value);
    }

    fn poison(&self, err: TaskError) {
        let mut inputs = self.inputs.lock().expect("TaskNode::poison: [1]");
        // The first failing ancestor wins.
        inputs.poison.get_or_insert(err);
    }

    /// One input arrived. The delivery that lands the counter on zero owns
    /// the dispatch.
    fn arrive(self: Arc<Self>, ctx: &Arc<ExecCtx>) {
        if self.core.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let node: Arc<dyn GraphNode> = self;
            ExecCtx::dispatch(ctx, node);
        }
    }
}

impl<A: TaskArgs, R: Send + 'static> GraphNode for TaskNode<A, R> {
    fn run(self: Arc<Self>, ctx: &Arc<ExecCtx>) {
        debug_assert_eq!(
            self.core.pending.load(Ordering::Acquire),
            0,
            "node dispatched before all inputs arrived"
        );
        let (partial, poison) = {
            let mut inputs = self.inputs.lock().expect("TaskNode::run: [1]");
            (core::mem::take(&mut inputs.args), inputs.poison.take())
        };
        let outcome = match poison {
            Some(err) => Err(err),
            None => {
                let args = A::assemble(partial).expect("TaskNode::run: [2]");
                let mut task = self.task.lock().expect("TaskNode::run: [3]");
                panic::catch_unwind(AssertUnwindSafe(|| (*task)(args))).map_err(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(
                        node = %self.core.name,
                        message = %message,
                        "task panicked; poisoning downstream",
                    );
                    TaskError::new(self.core.name.clone(), message)
                })
            }
        };
        let order_err = outcome.as_ref().err().cloned();

        let mut outputs = self.outputs.lock().expect("TaskNode::run: [4]");
        let moves = matches!(
            outputs.value_sinks.first(),
            Some(ValueSink {
                deliver: ValueDeliver::Move(_),
                ..
            })
        );
        if moves {
            // The wiring rules guarantee the move sink is the only value sink
            // and the node is not marked as output.
            let ValueSink {
                deliver: ValueDeliver::Move(deliver),
                ..
            } = &outputs.value_sinks[0]
            else {
                unreachable!("TaskNode::run: [5]")
            };
            deliver(ctx, outcome);
        } else {
            for sink in &outputs.value_sinks {
                let ValueDeliver::Clone(deliver) = &sink.deliver else {
                    unreachable!("TaskNode::run: [6]")
                };
                deliver(ctx, &outcome);
            }
            outputs.result = Some(outcome);
        }
        for sink in &outputs.order_sinks {
            (sink.deliver)(ctx, order_err.as_ref());
        }
        drop(outputs);

        ctx.complete_one();
    }

    fn reset(&self) {
        let mut inputs = self.inputs.lock().expect("TaskNode::reset: [1]");
        inputs.args = A::Partial::default();
        inputs.fed = 0;
        inputs.poison = None;
        drop(inputs);
        let mut outputs = self.outputs.lock().expect("TaskNode::reset: [2]");
        outputs.result = None;
        drop(outputs);
        self.core.pending.store(
            self.core.parent_target.load(Ordering::Acquire),
            Ordering::Release,
        );
    }

    fn pending(&self) -> usize {
        self.core.pending.load(Ordering::Acquire)
    }

    fn id(&self) -> NodeId {
        self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn downstream(&self) -> Vec<Arc<dyn GraphNode>> {
        let outputs = self.outputs.lock().expect("TaskNode::downstream: [1]");
        outputs
            .value_sinks
            .iter()
            .map(|sink| &sink.target)
            .chain(outputs.order_sinks.iter().map(|sink| &sink.target))
            .filter_map(Weak::upgrade)
            .collect()
    }
}
