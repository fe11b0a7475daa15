//! A tsc-shaped project checker.
//!
//! [`check_project`] reads every root through a [`FileResolver`], reports
//! syntax errors, resolves relative imports inside the project, and runs a
//! conservative set of semantic checks. Diagnostics carry tsc's numeric
//! codes and message texts.

mod checker;
pub mod options;
pub mod resolver;
pub mod types;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use options::CompilerOptions;
pub use resolver::{FileResolver, ResolverError, SnapshotResolver};

/// tsc's `DiagnosticCategory`, numbered the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Warning = 0,
    Error = 1,
    Suggestion = 2,
    Message = 3,
}

/// One checker finding. `file`, `start` and `length` are absent for
/// project-level problems such as bad compiler options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsDiagnostic {
    pub file: Option<String>,
    /// Byte offset into the file.
    pub start: Option<usize>,
    pub length: Option<usize>,
    pub message_text: String,
    pub category: DiagnosticCategory,
    pub code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// The checker attempted a write the resolver refused.
    #[error("checker attempted to write \"{path}\": {source}")]
    Violation {
        path: String,
        #[source]
        source: ResolverError,
    },
    #[error("invalid compiler options: {0}")]
    InvalidOptions(String),
}

/// Checks the program formed by `root_names`.
pub fn check_project(
    root_names: &[String],
    resolver: &dyn FileResolver,
    options: &CompilerOptions,
) -> Result<Vec<TsDiagnostic>, CheckError> {
    let diagnostics = checker::Program::load(root_names, resolver, options).check()?;
    debug!(
        roots = root_names.len(),
        diagnostics = diagnostics.len(),
        "checked project"
    );
    Ok(diagnostics)
}

/// Checks an in-memory project. Roots are every TypeScript file, plus
/// JavaScript files when `allowJs` is on; `overrides` is a JSON object of
/// compiler options layered over [`CompilerOptions::default`].
pub fn typecheck(
    files: BTreeMap<String, String>,
    overrides: Option<&Value>,
) -> Result<Vec<TsDiagnostic>, CheckError> {
    let mut options = CompilerOptions::default();
    let mut diagnostics = match overrides {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => options.apply_overrides(map),
        Some(other) => {
            return Err(CheckError::InvalidOptions(format!(
                "expected an object, got {other}"
            )));
        }
    };

    let resolver = SnapshotResolver::new(files);
    let roots: Vec<String> = resolver
        .file_names()
        .filter(|name| is_root(name, &options))
        .map(str::to_string)
        .collect();
    diagnostics.extend(check_project(&roots, &resolver, &options)?);
    Ok(diagnostics)
}

fn is_root(name: &str, options: &CompilerOptions) -> bool {
    let lower = name.to_ascii_lowercase();
    let typescript = [".ts", ".tsx", ".mts", ".cts"]
        .iter()
        .any(|ext| lower.ends_with(ext));
    let javascript = [".js", ".jsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| lower.ends_with(ext));
    typescript || (javascript && options.allow_js)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(files: &[(&str, &str)]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect()
    }

    #[test]
    fn roots_follow_allow_js() {
        let mut options = CompilerOptions::default();
        assert!(is_root("src/App.tsx", &options));
        assert!(is_root("types.d.ts", &options));
        assert!(is_root("main.js", &options));
        assert!(!is_root("package.json", &options));
        options.allow_js = false;
        assert!(!is_root("main.js", &options));
    }

    #[test]
    fn option_problems_come_first() {
        let diagnostics = typecheck(
            project(&[("a.ts", "const n: number = 'x';")]),
            Some(&json!({ "bogus": 1 })),
        )
        .unwrap();
        let codes: Vec<u32> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![5023, 2322]);
    }

    #[test]
    fn non_object_overrides_are_rejected() {
        let error = typecheck(project(&[]), Some(&json!([1]))).unwrap_err();
        assert!(matches!(error, CheckError::InvalidOptions(_)));
    }

    #[test]
    fn emitting_is_a_violation() {
        let error = typecheck(
            project(&[("a.ts", "export const a = 1;")]),
            Some(&json!({ "noEmit": false, "outDir": "dist" })),
        )
        .unwrap_err();
        match error {
            CheckError::Violation { path, .. } => assert_eq!(path, "dist/a.js"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
