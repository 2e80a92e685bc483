use camino::Utf8PathBuf;
use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Error)]
pub enum IaciqError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while reading action metadata:\n{0}")]
    Metadata(#[from] MetadataError),

    #[error("Error while building the dependency graph:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Error while collecting changes from git:\n{0}")]
    Git(#[from] GitError),

    #[error("Error while calculating concurrency groups:\n{0}")]
    Schedule(#[from] CycleError),

    #[error("Error while writing the report:\n{0}")]
    Report(#[from] ReportError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid log level: {0}")]
    LogLevel(String),

    #[error("At least one metadata file name is required")]
    NoFileNames,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Couldn't compile search pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't walk the repository tree.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't read metadata file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Error reading YAML file at '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid 'depends_on' in '{path}': expected a path or a list of paths, found {found}")]
    DependsOn {
        path: Utf8PathBuf,
        found: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Action '{node}' depends on '{dependency}', which has no metadata file")]
    UnknownDependency { node: NodeId, dependency: NodeId },
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git with args {args:?}.\n{source}")]
    Spawn {
        args: Vec<String>,
        source: std::io::Error,
    },

    #[error("Error executing command 'git {}'.\nSTDERR: {stderr}", .args.join(" "))]
    Command { args: Vec<String>, stderr: String },

    #[error("Unknown git reference '{reference}', expected a branch, tag or commit")]
    UnknownReference { reference: String },

    #[error("Couldn't restore the original git reference '{reference}'.\n{source}")]
    Restore {
        reference: String,
        source: Box<GitError>,
    },
}

/// The impacted subgraph could not be levelled.
///
/// `cycles` holds one closed walk through each strongly connected component
/// responsible, while `unresolved` also includes every node stuck behind them.
#[derive(Debug, Error, PartialEq, Eq)]
#[error(
    "unable to resolve dependencies into groups - cycle detected: {}",
    format_cycles(.cycles)
)]
pub struct CycleError {
    pub unresolved: Vec<NodeId>,
    pub cycles: Vec<Vec<NodeId>>,
}

fn format_cycles(cycles: &[Vec<NodeId>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut members: Vec<_> = cycle.iter().map(|node| node.as_str()).collect();
            if let Some(first) = cycle.first() {
                members.push(first.as_str());
            }
            members.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Couldn't write report to '{path}'.\n{source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
