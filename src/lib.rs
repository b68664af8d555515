//! Typed task-DAG executor with a fixed-size worker pool.
//!
//! This crate lets callers express a computation as a directed acyclic
//! graph of typed tasks and runs it with maximal parallelism on a bounded
//! worker pool. It:
//! - Wraps callables into nodes whose argument arity and result type are
//!   captured statically, with no signature spelled out at the call site.
//! - Carries a parent's result into a compile-known argument slot of a
//!   child (data edges), or orders execution without passing data
//!   (ordering edges).
//! - Dispatches a node the moment its last input arrives: the completing
//!   parent decrements the child's pending counter and enqueues the child
//!   when the counter lands on zero. No polling, no busy-waiting.
//! - Converts task panics into poison values that flow downstream, so an
//!   execution pass always terminates and `collect` reports which node
//!   originally failed.
//!
//! Key modules:
//! - `config`: executor construction options (worker count, queue
//!   capacity).
//! - `task`: the typed seam between callables and nodes (`TaskFn`,
//!   `TaskArgs`, `SlotAt`).
//! - `node`: node handles, dependency wiring, and result retrieval.
//! - `executor`: node ownership, cycle detection, and the execution pass.
//! - `pool`: the bounded-queue worker pool.
//!
//! Quick start:
//! 1. Create an [`executor::Executor`] and allocate nodes with
//!    `make_node`.
//! 2. Wire data edges with `set_parent::<SLOT>` (or `set_parent_move` for
//!    results that must not be cloned), ordering edges with `after`, and
//!    inject external inputs with `feed::<SLOT>`.
//! 3. Call `execute`, then `collect` the results you care about; `reset`
//!    rewinds the graph for another pass.
//!
//! ```
//! use dagex::executor::Executor;
//!
//! let mut executor = Executor::default();
//! let one = executor.make_node(|| 1);
//! let plus_two = executor.make_node(|x: i32| x + 2);
//! plus_two.set_parent::<0>(&one).unwrap();
//! executor.execute().unwrap();
//! assert_eq!(plus_two.collect().unwrap(), 3);
//! ```

/// Executor construction options.
pub mod config;
/// The DAG executor.
///
/// Owns the nodes, performs memoized cycle detection, discovers roots, and
/// drives one execution pass at a time: roots onto the pool, direct
/// wake-up of children as their inputs arrive, completion awaited under a
/// condition variable.
pub mod executor;
/// Typed task nodes and their wiring surface.
///
/// Defines the node handle with `set_parent`/`set_parent_move`/`after`/
/// `feed`/`collect`/`mark_as_output`, the wiring and retrieval errors, and
/// the poison value propagated from failed tasks.
pub mod node;
/// The bounded-queue worker pool the executor schedules onto.
pub mod pool;
/// The typed seam between user callables and nodes (`TaskFn`, `TaskArgs`,
/// `SlotAt`).
pub mod task;
/// Common types: node identifiers and crate-internal aliases.
pub mod types;
mod utils;
