use preview_protocol::{DiffView, FileView, PreviewError, PreviewResult};

/// One file's content and edit history.
///
/// History is a list of saved revisions above `original` plus a cursor.
/// Revisions below the cursor form the undo stack and revisions at or above
/// it form the redo stack; `original` itself is the implicit bottom and is
/// never stored as a revision.
#[derive(Debug, Clone)]
pub struct FileEntry {
    path: String,
    original: String,
    revisions: Vec<String>,
    cursor: usize,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original: original.into(),
            revisions: Vec::new(),
            cursor: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn current(&self) -> &str {
        match self.cursor {
            0 => &self.original,
            n => &self.revisions[n - 1],
        }
    }

    pub fn dirty(&self) -> bool {
        self.current() != self.original
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.revisions.len()
    }

    /// Number of states `undo` can step back through.
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    /// Number of states `redo` can step forward through.
    pub fn redo_depth(&self) -> usize {
        self.revisions.len() - self.cursor
    }

    pub fn view(&self) -> FileView {
        FileView {
            content: self.current().to_owned(),
            dirty: self.dirty(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    pub fn diff(&self) -> DiffView {
        DiffView {
            original: self.original.clone(),
            current: self.current().to_owned(),
        }
    }

    /// Records `content` as the newest revision and drops the redo stack,
    /// even when `content` equals the current content.
    pub fn save(&mut self, content: String) {
        self.revisions.truncate(self.cursor);
        self.revisions.push(content);
        self.cursor += 1;
    }

    pub fn undo(&mut self) -> PreviewResult<FileView> {
        if self.cursor == 0 {
            return Err(PreviewError::NothingToUndo(self.path.clone()));
        }
        self.cursor -= 1;
        Ok(self.view())
    }

    pub fn redo(&mut self) -> PreviewResult<FileView> {
        if self.cursor == self.revisions.len() {
            return Err(PreviewError::NothingToRedo(self.path.clone()));
        }
        self.cursor += 1;
        Ok(self.view())
    }

    /// Restores `original` and discards all history. Cannot be undone.
    pub fn reset(&mut self) -> FileView {
        self.revisions.clear();
        self.cursor = 0;
        self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> FileEntry {
        FileEntry::new("a.ts", "let x=1")
    }

    #[test]
    fn fresh_entry_is_clean_without_history() {
        let entry = entry();
        assert_eq!(entry.current(), "let x=1");
        assert!(!entry.dirty());
        assert!(!entry.can_undo());
        assert!(!entry.can_redo());
    }

    #[test]
    fn save_undo_redo_round_trip() {
        let mut entry = entry();
        assert!(entry.save("let x=1;".into()));
        assert!(entry.dirty());

        let view = entry.undo().unwrap();
        assert_eq!(view.content, "let x=1");
        assert!(!view.dirty);
        assert!(!view.can_undo);
        assert!(view.can_redo);

        let view = entry.redo().unwrap();
        assert_eq!(view.content, "let x=1;");
        assert!(view.dirty);
        assert!(view.can_undo);
        assert!(!view.can_redo);
    }

    #[test]
    fn empty_stacks_fail_with_their_own_errors() {
        let mut entry = entry();
        assert_eq!(
            entry.undo().unwrap_err(),
            PreviewError::NothingToUndo("a.ts".into())
        );
        assert_eq!(
            entry.redo().unwrap_err(),
            PreviewError::NothingToRedo("a.ts".into())
        );
    }

    #[test]
    fn saving_after_undo_drops_redo_history() {
        let mut entry = entry();
        entry.save("one".into());
        entry.save("two".into());
        entry.undo().unwrap();
        assert_eq!(entry.redo_depth(), 1);

        entry.save("three".into());
        assert_eq!(entry.current(), "three");
        assert!(!entry.can_redo());
        assert_eq!(entry.undo_depth(), 2);
        assert_eq!(entry.undo().unwrap().content, "one");
    }

    #[test]
    fn identical_save_is_still_a_revision() {
        let mut entry = entry();
        entry.save("let x=1".into());
        assert!(!entry.dirty());
        assert!(entry.can_undo());
        entry.save("b".into());
        entry.save("b".into());
        assert_eq!(entry.undo_depth(), 3);
    }

    #[test]
    fn identical_save_after_undo_clears_redo() {
        let mut entry = FileEntry::new("a.ts", "v0");
        entry.save("v1".into());
        entry.undo().unwrap();
        entry.save("v0".into());
        assert!(entry.can_undo());
        assert!(!entry.can_redo());
        assert_eq!(entry.undo().unwrap().content, "v0");
        assert!(!entry.can_undo());
    }

    #[test]
    fn alternating_undo_redo_returns_to_the_same_state() {
        let mut entry = entry();
        for revision in ["a", "b", "c"] {
            entry.save(revision.into());
        }
        for _ in 0..5 {
            entry.undo().unwrap();
            entry.redo().unwrap();
        }
        assert_eq!(entry.current(), "c");

        for _ in 0..3 {
            entry.undo().unwrap();
        }
        assert_eq!(entry.current(), "let x=1");
        for _ in 0..3 {
            entry.redo().unwrap();
        }
        assert_eq!(entry.current(), "c");
    }

    #[test]
    fn reset_restores_original_and_clears_both_stacks() {
        let mut entry = entry();
        entry.save("a".into());
        entry.save("b".into());
        entry.undo().unwrap();

        let view = entry.reset();
        assert_eq!(view.content, "let x=1");
        assert!(!view.dirty && !view.can_undo && !view.can_redo);
        assert_eq!(entry.undo_depth() + entry.redo_depth(), 0);
    }

    #[test]
    fn saving_the_original_text_is_clean_but_undoable() {
        let mut entry = entry();
        entry.save("edited".into());
        entry.save("let x=1".into());
        assert!(!entry.dirty());
        assert!(entry.can_undo());
        assert_eq!(entry.undo().unwrap().content, "edited");
    }
}
