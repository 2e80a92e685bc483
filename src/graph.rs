//! Forward dependency graph of actions.
//!
//! Every directory with a declaration file becomes a node, its `depends_on`
//! entries become outgoing edges. Edges point from the dependent to the
//! dependency, the opposite direction is derived by [`ReverseGraph`].
//!
//! [`ReverseGraph`]: crate::ReverseGraph

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use serde_yaml::Value;

use crate::error::{GraphError, IaciqError, MetadataError};
use crate::node::{base_name, resolve};
use crate::{NodeId, metadata};

/// Normalized metadata of a single action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    /// Display name, defaults to the base name of the directory.
    pub job_name: String,
    /// Absolute identifiers of the actions this one depends on.
    pub depends_on: BTreeSet<NodeId>,
    /// The declaration file this action was read from.
    #[serde(skip)]
    pub source: Utf8PathBuf,
    /// Any other fields found in the declaration.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Maps every node with metadata to the set of nodes it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, replacing its dependencies if it was already present.
    pub fn insert<I>(&mut self, node: impl Into<NodeId>, dependencies: I)
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.edges.insert(
            node.into(),
            dependencies.into_iter().map(Into::into).collect(),
        );
    }

    /// Dependencies of `node`, `None` if `node` has no metadata.
    pub fn dependencies(&self, node: &Utf8Path) -> Option<&BTreeSet<NodeId>> {
        self.edges.get(node)
    }

    pub fn contains(&self, node: &Utf8Path) -> bool {
        self.edges.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.edges.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &BTreeSet<NodeId>)> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges `(node, dependency)` whose target is not a node of this graph.
    pub fn dangling(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.edges.iter().flat_map(move |(node, deps)| {
            deps.iter()
                .filter(|dep| !self.edges.contains_key(*dep))
                .map(move |dep| (node, dep))
        })
    }
}

impl<N, I> FromIterator<(N, I)> for DependencyGraph
where
    N: Into<NodeId>,
    I: IntoIterator,
    I::Item: Into<NodeId>,
{
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut graph = DependencyGraph::new();
        for (node, deps) in iter {
            graph.insert(node, deps);
        }
        graph
    }
}

/// What to do with a dependency on a directory that has no metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownDependencies {
    /// Treat the dependency as always satisfied and log a warning.
    #[default]
    Allow,
    /// Fail the build.
    Deny,
}

/// Builds the [`DependencyGraph`] and the per-action metadata from a set of
/// candidate directories.
pub struct GraphBuilder<'a> {
    root: &'a Utf8Path,
    file_names: &'a [String],
    unknown: UnknownDependencies,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(root: &'a Utf8Path, file_names: &'a [String]) -> Self {
        Self {
            root,
            file_names,
            unknown: UnknownDependencies::default(),
        }
    }

    pub fn unknown_dependencies(mut self, policy: UnknownDependencies) -> Self {
        self.unknown = policy;
        self
    }

    /// Reads the declaration of every directory in `dirs`. Directories without
    /// a declaration file are left out of the graph entirely.
    pub fn build(
        &self,
        dirs: &[NodeId],
    ) -> Result<(DependencyGraph, BTreeMap<NodeId, Action>), IaciqError> {
        let loaded = dirs
            .par_iter()
            .map(|dir| self.action(dir).map(|action| (dir, action)))
            .collect::<Result<Vec<_>, MetadataError>>()?;

        let mut graph = DependencyGraph::new();
        let mut actions = BTreeMap::new();

        for (dir, action) in loaded {
            let Some(action) = action else {
                tracing::trace!("no metadata file in {dir}");
                continue;
            };
            graph.insert(dir.clone(), action.depends_on.iter().cloned());
            actions.insert(dir.clone(), action);
        }

        if let Some((node, dependency)) = graph.dangling().next()
            && self.unknown == UnknownDependencies::Deny
        {
            return Err(GraphError::UnknownDependency {
                node: node.clone(),
                dependency: dependency.clone(),
            }
            .into());
        }

        for (node, dependency) in graph.dangling() {
            tracing::warn!("{node} depends on {dependency}, which has no metadata file");
        }

        Ok((graph, actions))
    }

    fn action(&self, dir: &Utf8Path) -> Result<Option<Action>, MetadataError> {
        let Some((source, declaration)) = metadata::load(dir, self.file_names)? else {
            return Ok(None);
        };

        let depends_on = declaration
            .dependencies(&source)?
            .iter()
            .map(|dep| resolve(self.root, dep))
            .collect();

        Ok(Some(Action {
            job_name: declaration.job_name.unwrap_or_else(|| base_name(dir)),
            depends_on,
            source,
            extra: declaration.extra,
        }))
    }
}
