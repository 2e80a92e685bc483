use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Identifier of a directory-scoped action: an absolute, lexically normalized
/// path to the directory.
pub type NodeId = Utf8PathBuf;

/// Removes `.` components, resolves `..` against the preceding component and
/// drops trailing separators. Symlinks are not followed.
pub fn normalize(path: impl AsRef<Utf8Path>) -> NodeId {
    let mut acc = Utf8PathBuf::new();

    for component in path.as_ref().components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match acc.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    acc.pop();
                }
                // `..` at the top of an absolute path stays at the top
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => acc.push(".."),
            },
            other => acc.push(other.as_str()),
        }
    }

    acc
}

/// Resolves a dependency as declared in a metadata file. Declarations are
/// relative to the repository root, not to the declaring directory.
pub fn resolve(root: &Utf8Path, declared: &str) -> NodeId {
    normalize(root.join(declared))
}

/// Maps a changed file, relative to the repository root, onto the directory
/// that contains it.
pub fn containing_dir(root: &Utf8Path, file: &str) -> NodeId {
    let path = normalize(root.join(file));
    match path.parent() {
        Some(parent) => parent.to_owned(),
        None => path,
    }
}

/// Display name for a node: its base name, or the whole path for the root.
pub(crate) fn base_name(node: &Utf8Path) -> String {
    node.file_name().unwrap_or(node.as_str()).to_string()
}
