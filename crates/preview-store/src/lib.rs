//! Virtual file store for one preview session.
//!
//! A [`FileStore`] is created from a generated `{path -> content}` snapshot
//! and is the only place session files change. Paths are normalized on the
//! way in, so `src\\a.ts` and `./src/a.ts` address the same entry. Each
//! entry sits behind its own mutex: operations on one path are serialized
//! while different paths proceed independently.

pub mod archive;
pub mod diff;
mod entry;
pub mod tree;

use std::collections::BTreeMap;
use std::io;

use indexmap::IndexMap;
use parking_lot::Mutex;
use preview_protocol::{DiffView, FileView, PreviewError, PreviewResult, TreeNode, path};
use tracing::debug;

pub use entry::FileEntry;

#[derive(Debug, Default)]
pub struct FileStore {
    entries: IndexMap<String, Mutex<FileEntry>>,
}

impl FileStore {
    /// Builds a store from generated files, keeping generation order.
    /// Fails when the snapshot is empty, a path cannot be normalized, two
    /// paths normalize to the same key, or a file path is also used as a
    /// directory by another path.
    pub fn from_snapshot<P, C>(files: impl IntoIterator<Item = (P, C)>) -> PreviewResult<Self>
    where
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut entries = IndexMap::new();
        for (raw, content) in files {
            let raw = raw.as_ref();
            let key = path::normalize(raw)
                .ok_or_else(|| PreviewError::Generation(format!("invalid file path \"{raw}\"")))?;
            if entries.contains_key(&key) {
                return Err(PreviewError::Generation(format!(
                    "duplicate file path \"{key}\""
                )));
            }
            let entry = FileEntry::new(key.clone(), content);
            entries.insert(key, Mutex::new(entry));
        }
        if entries.is_empty() {
            return Err(PreviewError::Generation(
                "generated project contains no files".into(),
            ));
        }
        for key in entries.keys() {
            if let Some((end, _)) = key
                .match_indices('/')
                .find(|(end, _)| entries.contains_key(&key[..*end]))
            {
                return Err(PreviewError::Generation(format!(
                    "file \"{}\" is also a directory of \"{key}\"",
                    &key[..end]
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    /// Paths in generation order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn lookup(&self, raw: &str) -> PreviewResult<&Mutex<FileEntry>> {
        path::normalize(raw)
            .and_then(|key| self.entries.get(&key))
            .ok_or_else(|| PreviewError::FileNotFound(raw.to_owned()))
    }

    pub fn read(&self, path: &str) -> PreviewResult<FileView> {
        Ok(self.lookup(path)?.lock().view())
    }

    /// Saves `content` as the newest revision of `path`.
    pub fn save(&self, path: &str, content: impl Into<String>) -> PreviewResult<FileView> {
        let mut entry = self.lookup(path)?.lock();
        entry.save(content.into());
        debug!(path = entry.path(), undo_depth = entry.undo_depth(), "saved file");
        Ok(entry.view())
    }

    pub fn undo(&self, path: &str) -> PreviewResult<FileView> {
        self.lookup(path)?.lock().undo()
    }

    pub fn redo(&self, path: &str) -> PreviewResult<FileView> {
        self.lookup(path)?.lock().redo()
    }

    pub fn reset(&self, path: &str) -> PreviewResult<FileView> {
        let mut entry = self.lookup(path)?.lock();
        debug!(
            path = entry.path(),
            discarded = entry.undo_depth() + entry.redo_depth(),
            "reset file"
        );
        Ok(entry.reset())
    }

    pub fn diff(&self, path: &str) -> PreviewResult<DiffView> {
        Ok(self.lookup(path)?.lock().diff())
    }

    /// Unified diff of `path` against its generated content, for display.
    pub fn unified_diff(&self, path: &str) -> PreviewResult<String> {
        let entry = self.lookup(path)?.lock();
        Ok(diff::unified(entry.path(), entry.original(), entry.current()))
    }

    pub fn tree(&self) -> Vec<TreeNode> {
        tree::build(self.paths())
    }

    /// Current content of every file.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.lock().current().to_owned()))
            .collect()
    }

    /// Paths whose current content differs from the generated content, in
    /// generation order.
    pub fn dirty_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.lock().dirty())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Zip archive of the current file set under `<project_name>/`.
    pub fn archive(&self, project_name: &str) -> io::Result<Vec<u8>> {
        let current: Vec<(&str, String)> = self
            .entries
            .iter()
            .map(|(path, entry)| (path.as_str(), entry.lock().current().to_owned()))
            .collect();
        archive::zip(
            &archive::root_name(project_name),
            current.iter().map(|(path, content)| (*path, content.as_str())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn store(files: &[(&str, &str)]) -> FileStore {
        FileStore::from_snapshot(files.iter().copied()).unwrap()
    }

    #[test]
    fn save_undo_redo_scenario() {
        let store = store(&[("a.ts", "let x=1")]);

        let view = store.save("a.ts", "let x=1;").unwrap();
        assert!(view.dirty);

        let view = store.undo("a.ts").unwrap();
        assert_eq!(view.content, "let x=1");
        assert!(!view.dirty);
        assert!(view.can_redo);

        let view = store.redo("a.ts").unwrap();
        assert_eq!(view.content, "let x=1;");
        assert!(view.dirty);
    }

    #[test]
    fn missing_paths_are_file_not_found_for_every_operation() {
        let store = store(&[("a.ts", "")]);
        let missing = PreviewError::FileNotFound("b.ts".into());
        assert_eq!(store.read("b.ts").unwrap_err(), missing);
        assert_eq!(store.save("b.ts", "x").unwrap_err(), missing);
        assert_eq!(store.undo("b.ts").unwrap_err(), missing);
        assert_eq!(store.redo("b.ts").unwrap_err(), missing);
        assert_eq!(store.reset("b.ts").unwrap_err(), missing);
        assert_eq!(store.diff("b.ts").unwrap_err(), missing);
        assert_eq!(
            store.undo("a.ts").unwrap_err(),
            PreviewError::NothingToUndo("a.ts".into())
        );
    }

    #[test]
    fn lookups_normalize_paths() {
        let store = store(&[("src\\App.tsx", "x")]);
        assert_eq!(store.paths().collect::<Vec<_>>(), vec!["src/App.tsx"]);
        assert!(store.contains("./src/App.tsx"));
        assert!(store.contains("/src//App.tsx"));
        assert_eq!(store.read("src\\App.tsx").unwrap().content, "x");
    }

    #[test]
    fn snapshot_rejects_empty_invalid_and_duplicate_paths() {
        let empty: [(&str, &str); 0] = [];
        assert!(matches!(
            FileStore::from_snapshot(empty),
            Err(PreviewError::Generation(_))
        ));
        assert!(matches!(
            FileStore::from_snapshot([("../x.ts", "")]),
            Err(PreviewError::Generation(_))
        ));
        assert!(matches!(
            FileStore::from_snapshot([("a.ts", ""), ("./a.ts", "")]),
            Err(PreviewError::Generation(_))
        ));
    }

    #[test]
    fn snapshot_rejects_a_file_shadowing_a_directory() {
        for files in [
            [("a", "x"), ("a/b.ts", "y")],
            [("src/a/b.ts", "y"), ("./src/a", "x")],
        ] {
            let error = FileStore::from_snapshot(files).unwrap_err();
            assert!(matches!(error, PreviewError::Generation(ref m) if m.contains("directory")));
        }
        assert!(FileStore::from_snapshot([("a.ts", "x"), ("a/b.ts", "y")]).is_ok());
    }

    #[test]
    fn diff_is_byte_exact_and_read_only() {
        let store = store(&[("a.ts", "  let x = 1\r\n")]);
        store.save("a.ts", "let x = 1;\n").unwrap();
        let first = store.diff("a.ts").unwrap();
        let second = store.diff("a.ts").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.original, "  let x = 1\r\n");
        assert_eq!(first.current, "let x = 1;\n");
        assert!(store.read("a.ts").unwrap().can_undo);
    }

    #[test]
    fn reset_discards_history_regardless_of_depth() {
        let store = store(&[("a.ts", "0")]);
        for i in 1..=10 {
            store.save("a.ts", i.to_string()).unwrap();
        }
        store.undo("a.ts").unwrap();
        let view = store.reset("a.ts").unwrap();
        assert_eq!(view.content, "0");
        assert!(!view.dirty && !view.can_undo && !view.can_redo);
        assert_eq!(
            store.undo("a.ts").unwrap_err(),
            PreviewError::NothingToUndo("a.ts".into())
        );
    }

    #[test]
    fn snapshot_and_dirty_paths_follow_edits() {
        let store = store(&[("b.ts", "b"), ("a.ts", "a"), ("c.ts", "c")]);
        store.save("c.ts", "c2").unwrap();
        store.save("b.ts", "b2").unwrap();
        assert_eq!(store.dirty_paths(), vec!["b.ts", "c.ts"]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot["a.ts"], "a");
        assert_eq!(snapshot["b.ts"], "b2");
        assert_eq!(snapshot["c.ts"], "c2");
    }

    #[test]
    fn unified_diff_renders_changes() {
        let store = store(&[("a.ts", "let x=1\n")]);
        assert_eq!(store.unified_diff("a.ts").unwrap(), "");
        store.save("a.ts", "let x=1;\n").unwrap();
        let rendered = store.unified_diff("a.ts").unwrap();
        assert!(rendered.contains("+let x=1;"));
    }

    #[test]
    fn archive_uses_current_content() -> anyhow::Result<()> {
        use std::io::{Cursor, Read};

        let store = store(&[("a.ts", "old")]);
        store.save("a.ts", "new")?;
        let bytes = store.archive("demo")?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut content = String::new();
        archive.by_name("demo/a.ts")?.read_to_string(&mut content)?;
        assert_eq!(content, "new");
        Ok(())
    }

    #[test]
    fn concurrent_saves_on_one_path_keep_history_consistent() {
        let store = Arc::new(store(&[("a.ts", "base")]));
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|content| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.save("a.ts", content).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let winner = store.read("a.ts").unwrap().content;
        assert!(winner == "left" || winner == "right");
        let loser = if winner == "left" { "right" } else { "left" };

        assert_eq!(store.undo("a.ts").unwrap().content, loser);
        assert_eq!(store.undo("a.ts").unwrap().content, "base");
        assert!(store.undo("a.ts").is_err());
    }

    #[test]
    fn tree_projects_paths() {
        let store = store(&[("src/b.ts", ""), ("a.ts", "")]);
        let tree = store.tree();
        assert_eq!(tree[0].path, "src");
        assert_eq!(tree[1].path, "a.ts");
    }
}
