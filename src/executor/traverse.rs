use crate::{
    node::GraphNode,
    types::{IndexSet, NodeId},
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    OnStack,
    Finished,
}

/// Tricolor depth-first search over the whole node set; true on back-edge
/// detection.
///
/// Iterative with an explicit stack of `(node, next-edge)` frames, so deep
/// chains cannot overflow the call stack.
pub(super) fn has_cycle(nodes: &[Arc<dyn GraphNode>]) -> bool {
    let adjacency: Vec<Vec<NodeId>> = nodes
        .iter()
        .map(|node| {
            node.downstream()
                .iter()
                .map(|child| child.id())
                .collect()
        })
        .collect();
    let mut colors = vec![Color::Unvisited; nodes.len()];
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    for start in 0..nodes.len() {
        if colors[start] != Color::Unvisited {
            continue;
        }
        colors[start] = Color::OnStack;
        stack.push((start, 0));
        while let Some((node, edge)) = stack.last().copied() {
            let Some(&child) = adjacency[node].get(edge) else {
                colors[node] = Color::Finished;
                stack.pop();
                continue;
            };
            stack.last_mut().expect("has_cycle: [1]").1 += 1;
            match colors[child] {
                Color::OnStack => return true,
                Color::Unvisited => {
                    colors[child] = Color::OnStack;
                    stack.push((child, 0));
                }
                Color::Finished => {}
            }
        }
    }
    false
}

/// Number of distinct nodes reachable from `roots` via downstream edges,
/// the roots themselves included.
///
/// This is the completion target of one execution pass: exactly these nodes
/// will run and signal.
pub(super) fn reachable_count(roots: &[Arc<dyn GraphNode>]) -> usize {
    let mut seen: IndexSet<NodeId> = roots.iter().map(|node| node.id()).collect();
    let mut frontier: Vec<Arc<dyn GraphNode>> = roots.to_vec();
    while let Some(node) = frontier.pop() {
        for child in node.downstream() {
            if seen.insert(child.id()) {
                frontier.push(child);
            }
        }
    }
    seen.len()
}
