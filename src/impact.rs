use std::collections::{BTreeSet, VecDeque};

use crate::{DependencyGraph, NodeId, ReverseGraph};

/// Computes which actions need to run: every changed action plus everything
/// that depends on one, directly or through a chain of dependencies.
///
/// Changes outside of `universe` are ignored.
pub fn propagate(
    changed: &BTreeSet<NodeId>,
    graph: &DependencyGraph,
    universe: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    propagate_with(changed, &ReverseGraph::from_forward(graph), universe)
}

/// Same as [`propagate`], for callers which already hold the reverse graph.
pub fn propagate_with(
    changed: &BTreeSet<NodeId>,
    reverse: &ReverseGraph,
    universe: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    let mut impacted: BTreeSet<NodeId> = BTreeSet::new();

    for node in changed {
        if universe.contains(node) {
            impacted.insert(node.clone());
        } else {
            tracing::trace!("ignoring change in {node}, no metadata");
        }
    }

    let mut queue: VecDeque<NodeId> = impacted.iter().cloned().collect();

    while let Some(current) = queue.pop_front() {
        for dependent in reverse.dependents(&current) {
            if universe.contains(dependent) && !impacted.contains(dependent) {
                impacted.insert(dependent.clone());
                queue.push_back(dependent.clone());
            }
        }
    }

    impacted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<NodeId> {
        items.iter().map(NodeId::from).collect()
    }

    fn chain() -> DependencyGraph {
        [("/r/a", vec![]), ("/r/b", vec!["/r/a"]), ("/r/c", vec!["/r/b"])]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_transitive_closure() {
        let graph = chain();
        let universe: BTreeSet<_> = graph.nodes().cloned().collect();

        let impacted = propagate(&set(&["/r/a"]), &graph, &universe);
        assert_eq!(impacted, set(&["/r/a", "/r/b", "/r/c"]));

        let impacted = propagate(&set(&["/r/b"]), &graph, &universe);
        assert_eq!(impacted, set(&["/r/b", "/r/c"]));
    }

    #[test]
    fn test_unknown_change_is_dropped() {
        let graph = chain();
        let universe: BTreeSet<_> = graph.nodes().cloned().collect();

        let impacted = propagate(&set(&["/r/docs", "/r"]), &graph, &universe);
        assert!(impacted.is_empty());
    }

    #[test]
    fn test_change_in_dependency_without_metadata() {
        // `/r/shared` has no metadata: it doesn't seed the impacted set itself
        let graph: DependencyGraph = [("/r/a", vec!["/r/shared"]), ("/r/b", vec![])]
            .into_iter()
            .collect();
        let universe: BTreeSet<_> = graph.nodes().cloned().collect();

        let impacted = propagate(&set(&["/r/shared"]), &graph, &universe);
        assert!(impacted.is_empty());
    }

    #[test]
    fn test_dependents_outside_universe() {
        let graph = chain();
        let universe = set(&["/r/a", "/r/c"]);

        // b isn't in the universe, so the chain stops at a
        let impacted = propagate(&set(&["/r/a"]), &graph, &universe);
        assert_eq!(impacted, set(&["/r/a"]));
    }

    #[test]
    fn test_diamond_and_cycle_terminate() {
        let graph: DependencyGraph = [
            ("/r/a", vec!["/r/d"]),
            ("/r/b", vec!["/r/a"]),
            ("/r/c", vec!["/r/a"]),
            ("/r/d", vec!["/r/b", "/r/c"]),
        ]
        .into_iter()
        .collect();
        let universe: BTreeSet<_> = graph.nodes().cloned().collect();

        let impacted = propagate(&set(&["/r/b"]), &graph, &universe);
        assert_eq!(impacted, universe);
    }
}
