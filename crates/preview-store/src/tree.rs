//! Directory tree projection over a flat set of file paths.

use std::collections::{BTreeMap, BTreeSet};

use preview_protocol::TreeNode;

#[derive(Default)]
struct Dir {
    dirs: BTreeMap<String, Dir>,
    files: BTreeSet<String>,
}

impl Dir {
    fn insert(&mut self, path: &str) {
        let mut dir = self;
        let mut segments = path.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                dir.files.insert(segment.to_owned());
            } else {
                dir = dir.dirs.entry(segment.to_owned()).or_default();
            }
        }
    }

    fn into_nodes(self, prefix: &str) -> Vec<TreeNode> {
        let join = |name: &str| {
            if prefix.is_empty() {
                name.to_owned()
            } else {
                format!("{prefix}/{name}")
            }
        };
        let mut nodes = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, dir) in self.dirs {
            let path = join(&name);
            let children = dir.into_nodes(&path);
            nodes.push(TreeNode::dir(name, path, children));
        }
        for name in self.files {
            let path = join(&name);
            nodes.push(TreeNode::file(name, path));
        }
        nodes
    }
}

/// Builds the tree for `paths`. Directories come before files at every
/// level and each group is sorted by name, so the shape depends only on the
/// set of paths and not on their order.
pub fn build<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<TreeNode> {
    let mut root = Dir::default();
    for path in paths {
        root.insert(path);
    }
    root.into_nodes("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_protocol::NodeKind;

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.name.as_str()).collect()
    }

    #[test]
    fn directories_precede_files_and_sort_alphabetically() {
        let tree = build([
            "package.json",
            "src/main.ts",
            "README.md",
            "src/components/Button.tsx",
            "src/App.tsx",
            "public/index.html",
        ]);
        assert_eq!(names(&tree), vec!["public", "src", "README.md", "package.json"]);

        let src = &tree[1];
        assert_eq!(src.kind, NodeKind::Dir);
        assert_eq!(src.path, "src");
        let children = src.children.as_deref().unwrap();
        assert_eq!(names(children), vec!["components", "App.tsx", "main.ts"]);
        assert_eq!(children[0].children.as_deref().unwrap()[0].path, "src/components/Button.tsx");
        assert_eq!(children[2].kind, NodeKind::File);
        assert!(children[2].children.is_none());
    }

    #[test]
    fn shape_is_independent_of_input_order() {
        let a = build(["b/x.ts", "a.ts", "b/a.ts"]);
        let b = build(["b/a.ts", "b/x.ts", "a.ts"]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        assert!(build(std::iter::empty()).is_empty());
    }
}
