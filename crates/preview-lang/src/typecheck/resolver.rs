//! File access capability handed to the type checker.
//!
//! The checker never touches the host file system. Every existence check,
//! read, and write it performs goes through a [`FileResolver`], and the
//! only implementation shipped here answers from an in-memory snapshot and
//! refuses writes.

use std::collections::BTreeMap;

use preview_protocol::path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("write to \"{path}\" denied: no file system is available to the checker")]
    WriteDenied { path: String },
}

pub trait FileResolver {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Option<&str>;
    fn write(&self, path: &str, content: &str) -> Result<(), ResolverError>;
}

/// Resolver backed by a `{path -> content}` snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotResolver {
    files: BTreeMap<String, String>,
}

impl SnapshotResolver {
    /// Keys are normalized; entries whose path cannot be normalized are
    /// dropped.
    pub fn new(files: impl IntoIterator<Item = (String, String)>) -> Self {
        let files = files
            .into_iter()
            .filter_map(|(key, content)| path::normalize(&key).map(|key| (key, content)))
            .collect();
        Self { files }
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    fn lookup(&self, path: &str) -> Option<&String> {
        path::normalize(path).and_then(|key| self.files.get(&key))
    }
}

impl FileResolver for SnapshotResolver {
    fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn read(&self, path: &str) -> Option<&str> {
        self.lookup(path).map(String::as_str)
    }

    fn write(&self, path: &str, _content: &str) -> Result<(), ResolverError> {
        Err(ResolverError::WriteDenied {
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SnapshotResolver {
        SnapshotResolver::new([
            ("src\\a.ts".to_string(), "export const a = 1;".to_string()),
            ("./b.ts".to_string(), "b".to_string()),
        ])
    }

    #[test]
    fn lookups_normalize_separators_and_prefixes() {
        let resolver = resolver();
        assert!(resolver.exists("src/a.ts"));
        assert!(resolver.exists("/src/a.ts"));
        assert!(resolver.exists("./src\\a.ts"));
        assert_eq!(resolver.read("b.ts"), Some("b"));
        assert_eq!(resolver.file_names().collect::<Vec<_>>(), vec!["b.ts", "src/a.ts"]);
    }

    #[test]
    fn host_paths_are_not_visible() {
        let resolver = resolver();
        assert!(!resolver.exists("/etc/passwd"));
        assert_eq!(resolver.read("/etc/hostname"), None);
    }

    #[test]
    fn writes_are_refused() {
        assert_eq!(
            resolver().write("dist/a.js", "x"),
            Err(ResolverError::WriteDenied {
                path: "dist/a.js".into()
            })
        );
    }
}
