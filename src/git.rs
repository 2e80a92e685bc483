//! Change detection backed by the `git` executable.
use std::collections::BTreeSet;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::NodeId;
use crate::error::GitError;
use crate::node::{containing_dir, normalize};

pub const GIT_EXEC: &str = "git";

/// Anything that can tell which nodes changed since a reference point.
pub trait ChangeSource {
    fn changed_nodes_since(&self, reference: &str) -> Result<BTreeSet<NodeId>, GitError>;
}

/// A fixed set of changes, regardless of the reference.
impl ChangeSource for BTreeSet<NodeId> {
    fn changed_nodes_since(&self, _: &str) -> Result<BTreeSet<NodeId>, GitError> {
        Ok(self.clone())
    }
}

/// Runs a git command in `cwd` and returns its output.
fn git(cwd: &Utf8Path, args: &[&str]) -> Result<String, GitError> {
    let owned = || args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();

    let output = Command::new(GIT_EXEC)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| GitError::Spawn {
            args: owned(),
            source,
        })?;

    if !output.status.success() {
        return Err(GitError::Command {
            args: owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone)]
pub struct Repository {
    /// Absolute path of the top-level repository directory.
    root: Utf8PathBuf,
}

impl Repository {
    /// Finds the repository containing `start`.
    pub fn discover(start: impl AsRef<Utf8Path>) -> Result<Self, GitError> {
        let top_level = git(start.as_ref(), &["rev-parse", "--show-toplevel"])?;
        let root = Utf8PathBuf::from(top_level.trim());

        Ok(Self {
            root: normalize(root),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The branch currently checked out, or the commit hash when HEAD is
    /// detached.
    pub fn current_ref(&self) -> Result<String, GitError> {
        let branch = git(&self.root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = branch.trim();

        if branch != "HEAD" {
            return Ok(branch.to_string());
        }

        Ok(git(&self.root, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// The commit `reference` points to. Fails for anything git can't
    /// resolve to a commit, file paths included.
    pub fn resolve(&self, reference: &str) -> Result<String, GitError> {
        let spec = format!("{reference}^{{commit}}");

        match git(&self.root, &["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(commit) => Ok(commit.trim().to_string()),
            Err(GitError::Command { .. }) => Err(GitError::UnknownReference {
                reference: reference.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Switches the worktree to `reference`. The original reference is put
    /// back when the returned guard goes out of scope.
    pub fn checkout(&self, reference: &str) -> Result<Checkout<'_>, GitError> {
        let commit = self.resolve(reference)?;
        let original = self.current_ref()?;
        tracing::debug!("original git reference: {original}");

        // trailing `--` so git never reads the reference as a pathspec
        git(&self.root, &["checkout", "--quiet", reference, "--"])?;
        tracing::debug!("checked out {reference} ({commit})");

        Ok(Checkout {
            repo: self,
            original: Some(original),
        })
    }

    /// Files changed between `reference` and the worktree, relative to the
    /// repository root.
    pub fn changed_files(&self, reference: &str) -> Result<Vec<String>, GitError> {
        let output = git(
            &self.root,
            &[
                "-c",
                "diff.renames=0",
                "-c",
                "core.quotePath=false",
                "diff",
                "--name-only",
                reference,
                "--",
            ],
        )?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

impl ChangeSource for Repository {
    fn changed_nodes_since(&self, reference: &str) -> Result<BTreeSet<NodeId>, GitError> {
        // Switching to the reference and back proves the reference can be
        // checked out before anything is diffed against it.
        self.checkout(reference)?.restore()?;

        let files = self.changed_files(reference)?;
        tracing::debug!("{} files changed since {reference}", files.len());

        Ok(files
            .iter()
            .map(|file| containing_dir(&self.root, file))
            .collect())
    }
}

/// A reference checked out by [`Repository::checkout`].
///
/// The original reference is restored by [`Checkout::restore`], or on drop
/// if the guard is never restored explicitly.
#[must_use = "dropping the checkout restores the original reference immediately"]
pub struct Checkout<'a> {
    repo: &'a Repository,
    original: Option<String>,
}

impl Checkout<'_> {
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Restores the original reference, reporting any failure.
    pub fn restore(mut self) -> Result<(), GitError> {
        match self.original.take() {
            Some(original) => restore(self.repo, original),
            None => Ok(()),
        }
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take()
            && let Err(err) = restore(self.repo, original)
        {
            tracing::error!("{err}");
        }
    }
}

fn restore(repo: &Repository, original: String) -> Result<(), GitError> {
    match git(&repo.root, &["checkout", "--quiet", original.as_str(), "--"]) {
        Ok(_) => {
            tracing::debug!("restored to original git reference: {original}");
            Ok(())
        }
        Err(source) => Err(GitError::Restore {
            reference: original,
            source: Box::new(source),
        }),
    }
}
