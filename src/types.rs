use core::sync::atomic::{AtomicBool, Ordering};
use indexmap::IndexSet as _IndexSet;
use rustc_hash::FxBuildHasher;

/// Index of a node within its owning executor's arena.
///
/// Assigned consecutively by the node factory; stable for the lifetime of
/// the executor, which makes it usable as a direct index into traversal
/// scratch space.
pub type NodeId = usize;

pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;

/// Shared marker flipped by every operation that changes the graph's shape
/// (node creation, edge wiring).
///
/// The executor consumes the flag to memoize cycle detection: as long as the
/// stamp stays clean, the last verdict is still valid.
#[derive(Debug, Default)]
pub(crate) struct TopologyStamp {
    dirty: AtomicBool,
}

impl TopologyStamp {
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}
