//! Levelling of the impacted subgraph into concurrency groups.
//!
//! The algorithm is Kahn's topological sort done in rounds:
//!
//! 1. Every impacted node starts out pending.
//! 2. A round collects each pending node none of whose dependencies is still
//!    pending. These nodes form the next group and stop being pending.
//! 3. Rounds repeat until nothing is pending.
//!
//! Dependencies are looked up in the full forward graph. A dependency that
//! isn't pending, because it wasn't impacted or because it has no metadata at
//! all, is considered satisfied and never blocks. A node without any
//! dependencies is therefore always part of the first group.
//!
//! A round which makes no progress while nodes are still pending means the
//! pending subgraph has a cycle, and no plan is produced at all.

use std::collections::{BTreeSet, HashMap, VecDeque};

use camino::Utf8Path;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::CycleError;
use crate::{DependencyGraph, NodeId};

/// An ordered sequence of batches. All nodes in one batch can be processed in
/// parallel, and each batch only depends on batches before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcurrencyGroups {
    groups: Vec<BTreeSet<NodeId>>,
}

impl ConcurrencyGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BTreeSet<NodeId>> {
        self.groups.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BTreeSet<NodeId>> {
        self.groups.iter()
    }

    /// Zero-based index of the group `node` was scheduled in.
    pub fn group_of(&self, node: &Utf8Path) -> Option<usize> {
        self.groups.iter().position(|group| group.contains(node))
    }

    /// All scheduled nodes, in group order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.groups.iter().flatten()
    }
}

impl<'a> IntoIterator for &'a ConcurrencyGroups {
    type Item = &'a BTreeSet<NodeId>;
    type IntoIter = std::slice::Iter<'a, BTreeSet<NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// Serialized as `{"group1": [...], "group2": [...]}`, in order.
impl Serialize for ConcurrencyGroups {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (i, group) in self.groups.iter().enumerate() {
            map.serialize_entry(&format!("group{}", i + 1), group)?;
        }
        map.end()
    }
}

/// Partitions `impacted` into concurrency groups.
pub fn schedule(
    graph: &DependencyGraph,
    impacted: &BTreeSet<NodeId>,
) -> Result<ConcurrencyGroups, CycleError> {
    let mut pending = impacted.clone();
    let mut groups = Vec::new();

    while !pending.is_empty() {
        let ready: BTreeSet<NodeId> = pending
            .iter()
            .filter(|node| {
                !graph
                    .dependencies(node)
                    .is_some_and(|deps| deps.iter().any(|dep| pending.contains(dep)))
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            return Err(CycleError {
                cycles: find_cycles(graph, &pending),
                unresolved: pending.into_iter().collect(),
            });
        }

        for node in &ready {
            pending.remove(node);
        }

        tracing::trace!("group{} has {} nodes", groups.len() + 1, ready.len());
        groups.push(ready);
    }

    Ok(ConcurrencyGroups { groups })
}

/// Finds one closed walk through every non-trivial strongly connected
/// component of the subgraph induced by `pending`.
fn find_cycles(graph: &DependencyGraph, pending: &BTreeSet<NodeId>) -> Vec<Vec<NodeId>> {
    let mut subgraph: DiGraphMap<&Utf8Path, ()> = DiGraphMap::new();

    for node in pending {
        subgraph.add_node(node);
        for dep in graph.dependencies(node).into_iter().flatten() {
            if pending.contains(dep) {
                subgraph.add_edge(node, dep, ());
            }
        }
    }

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&subgraph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || subgraph.contains_edge(scc[0], scc[0]))
        .map(|scc| closed_walk(&subgraph, scc))
        .collect();

    cycles.sort();
    cycles
}

/// Walks from the smallest member of `scc` back to itself, staying inside
/// the component.
fn closed_walk(subgraph: &DiGraphMap<&Utf8Path, ()>, scc: Vec<&Utf8Path>) -> Vec<NodeId> {
    let members: BTreeSet<&Utf8Path> = scc.into_iter().collect();
    let Some(&start) = members.first() else {
        return vec![];
    };

    // breadth-first search for a member with an edge back into `start`
    let mut parent: HashMap<&Utf8Path, &Utf8Path> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut last = start;

    'search: while let Some(current) = queue.pop_front() {
        for next in subgraph.neighbors(current) {
            if next == start {
                last = current;
                break 'search;
            }
            if members.contains(next) && next != start && !parent.contains_key(next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    let mut walk = vec![last.to_owned()];
    let mut current = last;
    while let Some(&prev) = parent.get(current) {
        walk.push(prev.to_owned());
        current = prev;
    }
    walk.reverse();
    walk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<NodeId> {
        items.iter().map(NodeId::from).collect()
    }

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        edges
            .iter()
            .map(|(node, deps)| (*node, deps.iter().copied()))
            .collect()
    }

    fn assert_valid(graph: &DependencyGraph, impacted: &BTreeSet<NodeId>, groups: &ConcurrencyGroups) {
        // union equals the impacted set, without duplicates
        let scheduled: Vec<_> = groups.nodes().cloned().collect();
        let unique: BTreeSet<_> = scheduled.iter().cloned().collect();
        assert_eq!(scheduled.len(), unique.len());
        assert_eq!(&unique, impacted);

        // impacted dependencies always come first
        for node in impacted {
            let index = groups.group_of(node).unwrap();
            for dep in graph.dependencies(node).into_iter().flatten() {
                if let Some(dep_index) = groups.group_of(dep) {
                    assert!(dep_index < index, "{dep} must run before {node}");
                }
            }
        }

        assert!(groups.iter().all(|group| !group.is_empty()));
    }

    #[test]
    fn test_levels() {
        let graph = graph(&[
            ("/r/vpc", &[]),
            ("/r/dns", &[]),
            ("/r/db", &["/r/vpc"]),
            ("/r/app", &["/r/db", "/r/dns"]),
            ("/r/cdn", &["/r/app"]),
        ]);
        let impacted: BTreeSet<_> = graph.nodes().cloned().collect();

        let groups = schedule(&graph, &impacted).unwrap();

        assert_valid(&graph, &impacted, &groups);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.get(0), Some(&set(&["/r/dns", "/r/vpc"])));
        assert_eq!(groups.get(1), Some(&set(&["/r/db"])));
        assert_eq!(groups.get(2), Some(&set(&["/r/app"])));
        assert_eq!(groups.get(3), Some(&set(&["/r/cdn"])));
    }

    #[test]
    fn test_zero_dependency_nodes_in_first_group() {
        // `/r/leaf` has no dependencies, while the chain next to it is deep
        let graph = graph(&[
            ("/r/a", &[]),
            ("/r/b", &["/r/a"]),
            ("/r/c", &["/r/b"]),
            ("/r/d", &["/r/c"]),
            ("/r/leaf", &[]),
        ]);
        let impacted = set(&["/r/b", "/r/c", "/r/d", "/r/leaf"]);

        let groups = schedule(&graph, &impacted).unwrap();

        assert_valid(&graph, &impacted, &groups);
        assert_eq!(groups.group_of(Utf8Path::new("/r/leaf")), Some(0));
        // `/r/a` wasn't impacted, so `/r/b` doesn't wait for it
        assert_eq!(groups.group_of(Utf8Path::new("/r/b")), Some(0));
        assert_eq!(groups.group_of(Utf8Path::new("/r/a")), None);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_dependency_without_metadata_does_not_block() {
        let graph = graph(&[("/r/app", &["/r/nowhere"]), ("/r/web", &["/r/app"])]);
        let impacted = set(&["/r/app", "/r/web"]);

        let groups = schedule(&graph, &impacted).unwrap();

        assert_valid(&graph, &impacted, &groups);
        assert_eq!(groups.group_of(Utf8Path::new("/r/app")), Some(0));
        assert_eq!(groups.group_of(Utf8Path::new("/r/web")), Some(1));
    }

    #[test]
    fn test_empty_impacted_set() {
        let graph = graph(&[("/r/a", &[])]);

        let groups = schedule(&graph, &BTreeSet::new()).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = graph(&[("/r/a", &["/r/b"]), ("/r/b", &["/r/a"])]);
        let impacted = set(&["/r/a", "/r/b"]);

        let err = schedule(&graph, &impacted).unwrap_err();

        assert_eq!(err.unresolved, vec![NodeId::from("/r/a"), NodeId::from("/r/b")]);
        assert_eq!(err.cycles, vec![vec![NodeId::from("/r/a"), NodeId::from("/r/b")]]);
        assert!(
            err.to_string()
                .starts_with("unable to resolve dependencies into groups")
        );
        assert!(err.to_string().contains("/r/a -> /r/b -> /r/a"));
    }

    #[test]
    fn test_cycle_reports_blocked_nodes() {
        let graph = graph(&[
            ("/r/ok", &[]),
            ("/r/x", &["/r/ok", "/r/z"]),
            ("/r/y", &["/r/x"]),
            ("/r/z", &["/r/y"]),
            ("/r/self", &["/r/self"]),
            ("/r/after", &["/r/x"]),
        ]);
        let impacted: BTreeSet<_> = graph.nodes().cloned().collect();

        let err = schedule(&graph, &impacted).unwrap_err();

        assert_eq!(
            err.unresolved,
            vec![
                NodeId::from("/r/after"),
                NodeId::from("/r/self"),
                NodeId::from("/r/x"),
                NodeId::from("/r/y"),
                NodeId::from("/r/z"),
            ]
        );
        assert_eq!(
            err.cycles,
            vec![
                vec![NodeId::from("/r/self")],
                vec![NodeId::from("/r/x"), NodeId::from("/r/z"), NodeId::from("/r/y")],
            ]
        );
    }

    #[test]
    fn test_cycle_outside_impacted_set_is_ignored() {
        let graph = graph(&[("/r/a", &["/r/b"]), ("/r/b", &["/r/a"]), ("/r/c", &["/r/a"])]);
        let impacted = set(&["/r/c"]);

        let groups = schedule(&graph, &impacted).unwrap();
        assert_eq!(groups.get(0), Some(&set(&["/r/c"])));
    }

    #[test]
    fn test_serialize_group_names() {
        let graph = graph(&[("/r/a", &[]), ("/r/b", &["/r/a"])]);
        let impacted: BTreeSet<_> = graph.nodes().cloned().collect();
        let groups = schedule(&graph, &impacted).unwrap();

        let json = serde_json::to_string(&groups).unwrap();
        assert_eq!(json, r#"{"group1":["/r/a"],"group2":["/r/b"]}"#);
    }
}
