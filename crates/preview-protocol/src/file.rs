//! File tree and per-file views handed back to callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// One node of the projected file tree. Directories are inferred from path
/// segments and always carry `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
            children: None,
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Dir,
            children: Some(children),
        }
    }
}

/// Current content of a file plus its history flags. Returned by reads and
/// by undo, redo, and reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub content: String,
    pub dirty: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Original-vs-current pair, byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffView {
    pub original: String,
    pub current: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_node_uses_type_field() {
        let node = TreeNode::dir("src", "src", vec![TreeNode::file("a.ts", "src/a.ts")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["children"][0]["type"], "file");
        assert!(json["children"][0].get("children").is_none());
    }
}
