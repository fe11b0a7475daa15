//! Project-relative path normalization.
//!
//! Every file key in a session and every lookup made by sandboxed tools goes
//! through [`normalize`], so `src\\a.ts`, `./src/a.ts` and `/src/a.ts` all
//! address the same entry.

/// Normalizes a project path: `\` becomes `/`, leading `./` and `/` are
/// stripped, repeated separators collapse, and `.`/`..` segments resolve
/// lexically. Returns `None` for empty paths and paths escaping the root.
pub fn normalize(path: &str) -> Option<String> {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Directory portion of a normalized path (`""` for root-level files).
pub fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |index| &path[..index])
}

/// Resolves `specifier` relative to the directory containing `from_file`.
/// Specifiers starting with `/` resolve from the project root.
pub fn join(from_file: &str, specifier: &str) -> Option<String> {
    let specifier = specifier.replace('\\', "/");
    if specifier.starts_with('/') {
        return normalize(&specifier);
    }
    let base = parent(from_file);
    if base.is_empty() {
        normalize(&specifier)
    } else {
        normalize(&format!("{base}/{specifier}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unifies_separators_and_prefixes() {
        assert_eq!(normalize("src\\a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(normalize("./src//a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(normalize("/src/./lib/../a.ts").as_deref(), Some("src/a.ts"));
    }

    #[test]
    fn normalize_rejects_empty_and_escaping_paths() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("./"), None);
        assert_eq!(normalize("../etc/passwd"), None);
        assert_eq!(normalize("src/../../x"), None);
    }

    #[test]
    fn join_resolves_relative_to_importing_file() {
        assert_eq!(join("src/app.ts", "./util").as_deref(), Some("src/util"));
        assert_eq!(join("src/app.ts", "../lib/x").as_deref(), Some("lib/x"));
        assert_eq!(join("app.ts", "./util").as_deref(), Some("util"));
        assert_eq!(join("src/app.ts", "/etc/hosts").as_deref(), Some("etc/hosts"));
        assert_eq!(join("app.ts", "../../x"), None);
    }
}
