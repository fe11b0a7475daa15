//! Display rendering for original-vs-current pairs.
//!
//! [`FileEntry::diff`](crate::FileEntry::diff) hands back both texts
//! untouched; this module only renders them for humans.

use similar::TextDiff;

/// Context lines kept around each hunk.
pub const CONTEXT_RADIUS: usize = 3;

/// Unified diff of `original` against `current`, headed `a/<path>` and
/// `b/<path>`. Empty when the texts are equal.
pub fn unified(path: &str, original: &str, current: &str) -> String {
    if original == current {
        return String::new();
    }
    TextDiff::from_lines(original, current)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_texts_render_nothing() {
        assert_eq!(unified("a.ts", "let x = 1;\n", "let x = 1;\n"), "");
    }

    #[test]
    fn changed_line_renders_as_hunk() {
        let rendered = unified("src/a.ts", "let x=1\nlet y=2\n", "let x=1;\nlet y=2\n");
        assert!(rendered.starts_with("--- a/src/a.ts\n+++ b/src/a.ts\n"));
        assert!(rendered.contains("-let x=1\n"));
        assert!(rendered.contains("+let x=1;\n"));
        assert!(rendered.contains(" let y=2\n"));
    }

    #[test]
    fn whitespace_only_changes_are_visible() {
        let rendered = unified("a.ts", "a\n", "a \n");
        assert!(rendered.contains("-a\n"));
        assert!(rendered.contains("+a \n"));
    }
}
