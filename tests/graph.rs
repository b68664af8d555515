//! End-to-end graph construction, wiring rules, and result retrieval.

use dagex::{
    config::Options,
    executor::{ExecuteError, Executor},
    node::{CollectError, WireError},
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// Deliberately not `Clone`: results of this type must be moved.
#[derive(Debug, PartialEq, Eq)]
struct Unique(i32);

#[test]
fn diamond_with_copyable_ints() {
    // Graph:
    //   A
    //  / \
    // B   C
    //  \ /
    //   D
    let mut executor = Executor::default();
    let a = executor.make_node(|| 1);
    let b = executor.make_node(|x: i32| x + 2);
    let c = executor.make_node(|x: i32| x * 2);
    let d = executor.make_node(|x: i32, y: i32| x % y);
    b.set_parent::<0>(&a).unwrap();
    c.set_parent::<0>(&a).unwrap();
    d.set_parent::<0>(&b).unwrap();
    d.set_parent::<1>(&c).unwrap();

    assert!(!executor.has_cycle());
    executor.execute().unwrap();

    assert_eq!(b.collect().unwrap(), 3);
    assert_eq!(c.collect().unwrap(), 2);
    assert_eq!(d.collect().unwrap(), 1);
}

#[test]
fn ordering_only_chain_runs_each_node_once() {
    // N1 -> {N2, N3} -> N4, ordering edges only.
    let mut executor = Executor::new(Options::with_workers(2));
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..4).map(|_| AtomicUsize::new(0)).collect());
    let n2_done = Arc::new(AtomicBool::new(false));
    let n3_done = Arc::new(AtomicBool::new(false));

    let n1 = executor.make_node({
        let runs = Arc::clone(&runs);
        move || {
            runs[0].fetch_add(1, Ordering::SeqCst);
        }
    });
    let n2 = executor.make_node({
        let runs = Arc::clone(&runs);
        let done = Arc::clone(&n2_done);
        move || {
            runs[1].fetch_add(1, Ordering::SeqCst);
            done.store(true, Ordering::SeqCst);
        }
    });
    let n3 = executor.make_node({
        let runs = Arc::clone(&runs);
        let done = Arc::clone(&n3_done);
        move || {
            runs[2].fetch_add(1, Ordering::SeqCst);
            done.store(true, Ordering::SeqCst);
        }
    });
    let n4 = executor.make_node({
        let runs = Arc::clone(&runs);
        let n2_done = Arc::clone(&n2_done);
        let n3_done = Arc::clone(&n3_done);
        move || {
            assert!(
                n2_done.load(Ordering::SeqCst) && n3_done.load(Ordering::SeqCst),
                "started before both parents finished",
            );
            runs[3].fetch_add(1, Ordering::SeqCst);
        }
    });
    n2.after(&n1);
    n3.after(&n1);
    n4.after(&n2);
    n4.after(&n3);

    executor.execute().unwrap();

    for (index, count) in runs.iter().enumerate() {
        assert_eq!(count.load(Ordering::SeqCst), 1, "node {index}");
    }
    assert!(n4.collect().is_ok());
}

#[test]
fn cycle_is_detected_and_refused() {
    let mut executor = Executor::default();
    let a = executor.make_node(|| ());
    let b = executor.make_node(|| ());
    let c = executor.make_node(|| ());
    let d = executor.make_node(|| ());
    b.after(&a);
    c.after(&b);
    d.after(&c);
    a.after(&d);

    assert!(executor.has_cycle());
    assert_eq!(executor.execute(), Err(ExecuteError::Cycle));
}

#[test]
fn cycle_cache_is_invalidated_by_new_edges() {
    let mut executor = Executor::default();
    let a = executor.make_node(|| ());
    let b = executor.make_node(|| ());
    b.after(&a);
    assert!(!executor.has_cycle());
    assert!(!executor.has_cycle());

    a.after(&b);
    assert!(executor.has_cycle());
}

#[test]
fn move_only_result_handoff() {
    let mut executor = Executor::default();
    let parent = executor.make_node(|| Unique(10));
    let child = executor.make_node(|mut handle: Unique| {
        handle.0 = 6;
        handle
    });
    child.set_parent_move::<0>(&parent).unwrap();
    child.mark_as_output().unwrap();

    executor.execute().unwrap();

    assert_eq!(parent.collect(), Err(CollectError::NoResult));
    assert_eq!(child.collect().unwrap(), Unique(6));
}

#[test]
fn second_value_child_on_move_parent_is_rejected() {
    let mut executor = Executor::default();
    let parent = executor.make_node(|| Unique(1));
    let first = executor.make_node(|handle: Unique| handle.0);
    let second = executor.make_node(|handle: Unique| handle.0);
    first.set_parent_move::<0>(&parent).unwrap();
    assert!(matches!(
        second.set_parent_move::<0>(&parent),
        Err(WireError::FanOutViolation { .. }),
    ));
}

#[test]
fn move_edge_onto_clone_fan_out_is_rejected() {
    let mut executor = Executor::default();
    let parent = executor.make_node(|| 1);
    let cloned = executor.make_node(|x: i32| x);
    let moved = executor.make_node(|x: i32| x);
    cloned.set_parent::<0>(&parent).unwrap();
    assert!(matches!(
        moved.set_parent_move::<0>(&parent),
        Err(WireError::FanOutViolation { .. }),
    ));
}

#[test]
fn move_edge_and_output_marking_conflict_in_both_orders() {
    let mut executor = Executor::default();

    let parent = executor.make_node(|| Unique(1));
    let child = executor.make_node(|handle: Unique| handle.0);
    parent.mark_as_output().unwrap();
    assert!(matches!(
        child.set_parent_move::<0>(&parent),
        Err(WireError::OutputConflict { .. }),
    ));

    let parent = executor.make_node(|| Unique(2));
    let child = executor.make_node(|handle: Unique| handle.0);
    child.set_parent_move::<0>(&parent).unwrap();
    assert!(matches!(
        parent.mark_as_output(),
        Err(WireError::OutputConflict { .. }),
    ));
}

#[test]
fn manual_feed_and_reset() {
    let mut executor = Executor::default();
    let a = executor.make_node(|x: i32| x);
    let b = executor.make_node(|a: i32| a + 2);
    let c = executor.make_node(|a: i32| a * 2);
    let d = executor.make_node(|a: i32, b: i32| a % b);
    b.set_parent::<0>(&a).unwrap();
    c.set_parent::<0>(&a).unwrap();
    d.set_parent::<0>(&b).unwrap();
    d.set_parent::<1>(&c).unwrap();

    a.feed::<0>(10).unwrap();
    executor.execute().unwrap();
    assert_eq!(d.collect().unwrap(), 12);

    executor.reset();
    a.feed::<0>(20).unwrap();
    executor.execute().unwrap();
    assert_eq!(d.collect().unwrap(), 22);
}

#[test]
fn feeding_a_wired_slot_is_rejected() {
    let mut executor = Executor::default();
    let a = executor.make_node(|| 1);
    let b = executor.make_node(|x: i32| x);
    b.set_parent::<0>(&a).unwrap();
    assert!(matches!(
        b.feed::<0>(5),
        Err(WireError::SlotConflict { slot: 0, .. }),
    ));
}

#[test]
fn feeding_the_same_slot_twice_is_rejected() {
    let mut executor = Executor::default();
    let a = executor.make_node(|x: i32| x);
    a.feed::<0>(1).unwrap();
    assert!(matches!(
        a.feed::<0>(2),
        Err(WireError::SlotConflict { slot: 0, .. }),
    ));
}

#[test]
fn wiring_a_fed_slot_is_rejected() {
    let mut executor = Executor::default();
    let a = executor.make_node(|| 1);
    let b = executor.make_node(|x: i32| x);
    b.feed::<0>(5).unwrap();
    assert!(matches!(
        b.set_parent::<0>(&a),
        Err(WireError::SlotConflict { slot: 0, .. }),
    ));
}

#[test]
fn second_execute_requires_reset() {
    let mut executor = Executor::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let _node = executor.make_node({
        let runs = Arc::clone(&runs);
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    executor.execute().unwrap();
    assert_eq!(executor.execute(), Err(ExecuteError::NotReset));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    executor.reset();
    executor.execute().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn collect_before_execution_reports_no_result() {
    let mut executor = Executor::default();
    let node = executor.make_node(|| 1);
    assert_eq!(node.collect(), Err(CollectError::NoResult));
}

#[test]
fn collect_takes_the_result_out() {
    let mut executor = Executor::default();
    let node = executor.make_node(|| 1);
    executor.execute().unwrap();
    assert_eq!(node.collect().unwrap(), 1);
    assert_eq!(node.collect(), Err(CollectError::NoResult));
}

#[test]
fn panicking_task_poisons_downstream_and_execution_terminates() {
    let mut executor = Executor::default();
    let boom = executor.make_named_node("boom", || -> i32 { panic!("boom") });
    let child = executor.make_node(|x: i32| x + 1);
    let grandchild = executor.make_node(|x: i32| x * 2);
    let ordered = executor.make_node(|| 7);
    child.set_parent::<0>(&boom).unwrap();
    grandchild.set_parent::<0>(&child).unwrap();
    ordered.after(&boom);

    // Terminates despite the failure.
    executor.execute().unwrap();

    match child.collect() {
        Err(CollectError::Failed(err)) => assert_eq!(err.origin(), "boom"),
        other => panic!("expected a poisoned child, got {other:?}"),
    }
    match grandchild.collect() {
        Err(CollectError::Failed(err)) => assert_eq!(err.origin(), "boom"),
        other => panic!("expected a poisoned grandchild, got {other:?}"),
    }
    // Ordering edges propagate the failure as well.
    assert!(matches!(ordered.collect(), Err(CollectError::Failed(_))));
}

#[test]
fn siblings_of_a_failed_node_still_run() {
    let mut executor = Executor::default();
    let root = executor.make_node(|| 3);
    let boom = executor.make_named_node("boom", |_x: i32| -> i32 { panic!("nope") });
    let fine = executor.make_node(|x: i32| x + 1);
    boom.set_parent::<0>(&root).unwrap();
    fine.set_parent::<0>(&root).unwrap();

    executor.execute().unwrap();

    assert!(matches!(boom.collect(), Err(CollectError::Failed(_))));
    assert_eq!(fine.collect().unwrap(), 4);
}

#[test]
fn named_nodes_show_up_in_wiring_errors() {
    let mut executor = Executor::default();
    let parent = executor.make_named_node("producer", || Unique(1));
    let first = executor.make_node(|handle: Unique| handle.0);
    let second = executor.make_node(|handle: Unique| handle.0);
    first.set_parent_move::<0>(&parent).unwrap();
    match second.set_parent_move::<0>(&parent) {
        Err(WireError::FanOutViolation { parent }) => assert_eq!(&*parent, "producer"),
        other => panic!("expected a fan-out violation, got {other:?}"),
    }
}
