//! JSON report of a [`Plan`].
//!
//! All fields are grouped under a single top-level `"iaciq"` key:
//!
//! ```json
//! {
//!     "iaciq": {
//!         "dependency_graph": { "/repo/app": ["/repo/vpc"], "/repo/vpc": [] },
//!         "reverse_dependency_graph": { "/repo/vpc": ["/repo/app"] },
//!         "folders_with_updates": ["/repo/vpc"],
//!         "folders_with_metadata": ["/repo/app", "/repo/vpc"],
//!         "folders_to_process": ["/repo/app", "/repo/vpc"],
//!         "concurrency_groups": { "group1": ["/repo/vpc"], "group2": ["/repo/app"] },
//!         "metadata": { "/repo/app": { "job_name": "app", "depends_on": ["/repo/vpc"] } }
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::ReportError;
use crate::{Action, ConcurrencyGroups, DependencyGraph, NodeId, Plan, ReverseGraph};

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    iaciq: Body<'a>,
}

#[derive(Debug, Serialize)]
struct Body<'a> {
    dependency_graph: &'a DependencyGraph,
    reverse_dependency_graph: &'a ReverseGraph,
    folders_with_updates: &'a BTreeSet<NodeId>,
    folders_with_metadata: &'a [NodeId],
    folders_to_process: &'a BTreeSet<NodeId>,
    concurrency_groups: &'a ConcurrencyGroups,
    metadata: &'a BTreeMap<NodeId, Action>,
}

impl<'a> Report<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        Self {
            iaciq: Body {
                dependency_graph: &plan.graph,
                reverse_dependency_graph: &plan.reverse,
                folders_with_updates: &plan.changed,
                folders_with_metadata: &plan.folders_with_metadata,
                folders_to_process: &plan.impacted,
                concurrency_groups: &plan.groups,
                metadata: &plan.actions,
            },
        }
    }

    /// Writes the report, pretty printed with a four space indent.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut buffer = Vec::new();
        self.to_writer(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Writes the report to `path`. The content goes to a temporary sibling
    /// file first, so `path` is either replaced completely or left alone.
    pub fn write(&self, path: &Utf8Path) -> Result<(), ReportError> {
        let io = |source| ReportError::Io {
            path: path.to_owned(),
            source,
        };

        let mut text = self.to_json()?;
        text.push('\n');

        let staging = staging_path(path);
        fs::write(&staging, text).map_err(io)?;
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(io(err));
        }

        Ok(())
    }
}

fn staging_path(path: &Utf8Path) -> Utf8PathBuf {
    let name = path.file_name().unwrap_or("report.json");
    path.with_file_name(format!(".{name}.tmp"))
}
