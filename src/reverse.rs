use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use serde::Serialize;

use crate::{DependencyGraph, NodeId};

/// Maps a dependency target to the nodes that declared it.
///
/// Targets without metadata of their own are still keys here, they can gate
/// downstream nodes even though nothing is scheduled for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReverseGraph {
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl ReverseGraph {
    pub fn from_forward(graph: &DependencyGraph) -> Self {
        let mut dependents: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        for (node, dependencies) in graph.iter() {
            for dependency in dependencies {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(node.clone());
            }
        }

        Self { dependents }
    }

    /// Nodes which declared `node` as a dependency.
    pub fn dependents(&self, node: &Utf8Path) -> impl Iterator<Item = &NodeId> {
        self.dependents.get(node).into_iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &BTreeSet<NodeId>)> {
        self.dependents.iter()
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }
}

impl From<&DependencyGraph> for ReverseGraph {
    fn from(graph: &DependencyGraph) -> Self {
        Self::from_forward(graph)
    }
}
