#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
mod error;
pub mod git;
mod graph;
pub mod impact;
pub mod metadata;
pub mod node;
pub mod report;
mod reverse;
pub mod schedule;

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};

pub use crate::config::Settings;
pub use crate::error::*;
pub use crate::git::{ChangeSource, Repository};
pub use crate::graph::{Action, DependencyGraph, GraphBuilder, UnknownDependencies};
pub use crate::node::NodeId;
pub use crate::report::Report;
pub use crate::reverse::ReverseGraph;
pub use crate::schedule::{ConcurrencyGroups, schedule};

/// The result of a planning run, with every intermediate artifact kept for
/// the report.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Repository root every node is resolved against.
    pub root: Utf8PathBuf,
    /// Directories holding a declaration file, sorted.
    pub folders_with_metadata: Vec<NodeId>,
    pub graph: DependencyGraph,
    pub actions: BTreeMap<NodeId, Action>,
    pub reverse: ReverseGraph,
    /// Directories touched since the reference point.
    pub changed: BTreeSet<NodeId>,
    /// Actions which have to run.
    pub impacted: BTreeSet<NodeId>,
    pub groups: ConcurrencyGroups,
}

/// Computes which actions under `root` have to run, and in what order, given
/// the changes reported by `changes` since `settings.git_ref`.
pub fn plan(
    settings: &Settings,
    root: &Utf8Path,
    changes: &dyn ChangeSource,
) -> Result<Plan, IaciqError> {
    settings.validate()?;

    let span = tracing::info_span!("plan", root = %root, git_ref = %settings.git_ref);
    let _enter = span.enter();

    let file_names = &settings.file_names;

    let folders_with_metadata = metadata::discover(root, file_names)?;
    tracing::debug!("folders with metadata: {folders_with_metadata:?}");

    let (graph, actions) = GraphBuilder::new(root, file_names)
        .unknown_dependencies(settings.unknown_dependencies)
        .build(&folders_with_metadata)?;
    tracing::debug!("dependency graph: {graph:?}");
    tracing::debug!("action content: {actions:?}");

    let reverse = ReverseGraph::from_forward(&graph);
    tracing::debug!("reverse dependency graph: {reverse:?}");

    let changed = changes.changed_nodes_since(&settings.git_ref)?;
    tracing::debug!("folders with updates: {changed:?}");

    let universe: BTreeSet<NodeId> = graph.nodes().cloned().collect();
    let impacted = impact::propagate_with(&changed, &reverse, &universe);
    tracing::debug!("folders to process: {impacted:?}");

    let groups = schedule(&graph, &impacted)?;
    tracing::debug!("concurrency groups: {groups:?}");

    tracing::info!(
        "{} of {} actions to run in {} groups",
        impacted.len(),
        graph.len(),
        groups.len()
    );

    Ok(Plan {
        root: root.to_owned(),
        folders_with_metadata,
        graph,
        actions,
        reverse,
        changed,
        impacted,
        groups,
    })
}
