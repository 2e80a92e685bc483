//! Discovery and parsing of action declaration files.
//!
//! A directory becomes an action as soon as it holds one of the recognized
//! declaration files. The file is a small YAML mapping:
//!
//! ```yaml
//! job_name: network
//! depends_on:
//!   - stacks/vpc
//!   - stacks/dns
//! region: eu-west-1
//! ```
//!
//! Only `job_name` and `depends_on` carry meaning, every other key is kept
//! verbatim and passed through to the report.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern, glob_with};
use serde::Deserialize;
use serde_yaml::Value;

use crate::NodeId;
use crate::error::MetadataError;

/// File names recognized when the caller doesn't provide any.
pub const DEFAULT_FILE_NAMES: [&str; 2] = ["iaciq.yml", "iaciq.yaml"];

/// Literal values of `depends_on` which mean "no dependencies".
const NO_DEPENDENCIES: [&str; 2] = ["none", "None"];

/// A declaration file as written by the user, before any defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Declaration {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub depends_on: Value,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Declaration {
    /// Returns the declared dependencies, exactly as written.
    ///
    /// * absent, `null`, or `"none"` means no dependencies,
    /// * a single string is a one-element list,
    /// * a list must contain only strings.
    ///
    /// Anything else is rejected, `path` is only used for error reporting.
    pub fn dependencies(&self, path: &Utf8Path) -> Result<Vec<String>, MetadataError> {
        let invalid = |found| MetadataError::DependsOn {
            path: path.to_owned(),
            found,
        };

        match &self.depends_on {
            Value::Null => Ok(vec![]),
            Value::String(dep) if NO_DEPENDENCIES.contains(&dep.as_str()) => Ok(vec![]),
            Value::String(dep) => Ok(vec![dep.clone()]),
            Value::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(dep) => Ok(dep.clone()),
                    other => Err(invalid(shape(other))),
                })
                .collect(),
            other => Err(invalid(shape(other))),
        }
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list containing a non-string item",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Lists every directory under `root` (including `root` itself) that holds at
/// least one of the `file_names`. The result is sorted.
pub fn discover(root: &Utf8Path, file_names: &[String]) -> Result<Vec<NodeId>, MetadataError> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let base = Pattern::escape(root.as_str());
    let mut found = BTreeSet::new();

    for name in file_names {
        let pattern = format!("{base}/**/{}", Pattern::escape(name));
        for path in glob_with(&pattern, options)? {
            let path = Utf8PathBuf::try_from(path?)?;
            if !path.is_file() {
                continue;
            }
            if let Some(dir) = path.parent() {
                found.insert(crate::node::normalize(dir));
            }
        }
    }

    Ok(found.into_iter().collect())
}

/// Returns the first of `file_names` present in `dir`.
pub fn locate(dir: &Utf8Path, file_names: &[String]) -> Option<Utf8PathBuf> {
    file_names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Reads and parses a single declaration file.
pub fn read(path: &Utf8Path) -> Result<Declaration, MetadataError> {
    let text = fs::read_to_string(path).map_err(|source| MetadataError::Read {
        path: path.to_owned(),
        source,
    })?;

    // `yaml.safe_load` semantics: an empty document is an empty declaration
    if text.trim().is_empty() {
        return Ok(Declaration::default());
    }

    serde_yaml::from_str(&text).map_err(|source| MetadataError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Loads the declaration of `dir`.
///
/// `Ok(None)` means the directory has no declaration file, which is expected
/// for most directories. A file that exists but can't be parsed is an error.
pub fn load(
    dir: &Utf8Path,
    file_names: &[String],
) -> Result<Option<(Utf8PathBuf, Declaration)>, MetadataError> {
    match locate(dir, file_names) {
        Some(path) => {
            let declaration = read(&path)?;
            Ok(Some((path, declaration)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        DEFAULT_FILE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn parse(text: &str) -> Declaration {
        serde_yaml::from_str(text).unwrap()
    }

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_depends_on_scalar_is_singleton() {
        let path = Utf8Path::new("iaciq.yml");
        let scalar = parse("depends_on: stacks/vpc");
        let list = parse("depends_on: [stacks/vpc]");

        assert_eq!(scalar.dependencies(path).unwrap(), vec!["stacks/vpc"]);
        assert_eq!(
            scalar.dependencies(path).unwrap(),
            list.dependencies(path).unwrap()
        );
    }

    #[test]
    fn test_depends_on_none_and_absent() {
        let path = Utf8Path::new("iaciq.yml");

        assert!(parse("depends_on: none").dependencies(path).unwrap().is_empty());
        assert!(parse("depends_on: None").dependencies(path).unwrap().is_empty());
        assert!(parse("depends_on:").dependencies(path).unwrap().is_empty());
        assert!(parse("job_name: x").dependencies(path).unwrap().is_empty());

        // the sentinel is case-sensitive
        assert_eq!(
            parse("depends_on: NONE").dependencies(path).unwrap(),
            vec!["NONE"]
        );
    }

    #[test]
    fn test_depends_on_bad_shapes() {
        let path = Utf8Path::new("a/iaciq.yml");

        for text in ["depends_on: 3", "depends_on: {a: b}", "depends_on: [a, 1]"] {
            match parse(text).dependencies(path) {
                Err(MetadataError::DependsOn { path: p, .. }) => assert_eq!(p, path),
                other => panic!("expected DependsOn error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let decl = parse("job_name: net\nregion: eu-west-1\nreplicas: 2\n");

        assert_eq!(decl.job_name.as_deref(), Some("net"));
        assert_eq!(decl.extra.len(), 2);
        assert_eq!(decl.extra["region"], Value::String("eu-west-1".into()));
    }

    #[test]
    fn test_discover_and_priority() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);

        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::create_dir_all(root.join("d")).unwrap();
        fs::write(root.join("a/iaciq.yml"), "job_name: a\n").unwrap();
        fs::write(root.join("a/b/iaciq.yaml"), "").unwrap();
        fs::write(root.join("c/iaciq.yml"), "job_name: first\n").unwrap();
        fs::write(root.join("c/iaciq.yaml"), "job_name: second\n").unwrap();
        fs::write(root.join("d/other.yml"), "job_name: d\n").unwrap();

        let found = discover(&root, &names()).unwrap();
        assert_eq!(found, vec![root.join("a"), root.join("a/b"), root.join("c")]);

        let (path, decl) = load(&root.join("c"), &names()).unwrap().unwrap();
        assert_eq!(path, root.join("c/iaciq.yml"));
        assert_eq!(decl.job_name.as_deref(), Some("first"));

        // reversed priority picks the other file
        let reversed: Vec<String> = names().into_iter().rev().collect();
        let (path, _) = load(&root.join("c"), &reversed).unwrap().unwrap();
        assert_eq!(path, root.join("c/iaciq.yaml"));
    }

    #[test]
    fn test_discover_includes_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        fs::write(root.join("iaciq.yml"), "").unwrap();

        assert_eq!(discover(&root, &names()).unwrap(), vec![root.clone()]);
    }

    #[test]
    fn test_load_missing_vs_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);

        assert!(load(&root, &names()).unwrap().is_none());

        fs::write(root.join("iaciq.yml"), "depends_on: [unclosed\n").unwrap();
        match load(&root, &names()) {
            Err(MetadataError::Parse { path, .. }) => assert_eq!(path, root.join("iaciq.yml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        fs::write(root.join("iaciq.yml"), "\n\n").unwrap();

        assert_eq!(read(&root.join("iaciq.yml")).unwrap(), Declaration::default());
    }

    #[test]
    fn test_non_mapping_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        fs::write(root.join("iaciq.yml"), "- a\n- b\n").unwrap();

        assert!(matches!(
            read(&root.join("iaciq.yml")),
            Err(MetadataError::Parse { .. })
        ));
    }
}
