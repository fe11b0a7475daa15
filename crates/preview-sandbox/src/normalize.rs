//! Conversion of native tool findings into [`Diagnostic`].
//!
//! Linter messages are already 1-indexed but may lack a position; checker
//! diagnostics carry byte offsets into a named file, or nothing at all for
//! project-level problems. Missing positions become `(1, 1)`.

use std::collections::BTreeMap;

use preview_lang::{DiagnosticCategory, LineIndex, LintMessage, SEVERITY_ERROR, TsDiagnostic};
use preview_protocol::{Diagnostic, DiagnosticSource, Severity, path};

pub fn eslint(messages: &[LintMessage]) -> Vec<Diagnostic> {
    messages.iter().map(eslint_message).collect()
}

pub fn eslint_message(message: &LintMessage) -> Diagnostic {
    Diagnostic {
        file: None,
        line: message.line.unwrap_or(1).max(1),
        column: message.column.unwrap_or(1).max(1),
        message: message.message.clone(),
        severity: if message.severity >= SEVERITY_ERROR {
            Severity::Error
        } else {
            Severity::Warning
        },
        source: DiagnosticSource::Eslint,
        code: message.rule_id.map(str::to_owned),
    }
}

/// Converts checker diagnostics, resolving byte offsets against the file
/// contents the check ran on. The checker names files by their normalized
/// path, so request keys are normalized before lookup.
pub fn typescript(diagnostics: &[TsDiagnostic], files: &BTreeMap<String, String>) -> Vec<Diagnostic> {
    let contents: BTreeMap<String, &str> = files
        .iter()
        .filter_map(|(key, content)| path::normalize(key).map(|key| (key, content.as_str())))
        .collect();
    let mut indexes: BTreeMap<&str, LineIndex<'_>> = BTreeMap::new();
    diagnostics
        .iter()
        .map(|diagnostic| {
            let position = match (&diagnostic.file, diagnostic.start) {
                (Some(file), Some(start)) => contents.get(file).map(|content| {
                    indexes
                        .entry(file.as_str())
                        .or_insert_with(|| LineIndex::new(*content))
                        .one_based(start)
                }),
                _ => None,
            };
            let (line, column) = position.unwrap_or((1, 1));
            Diagnostic {
                file: diagnostic.file.clone(),
                line,
                column,
                message: diagnostic.message_text.clone(),
                severity: severity(diagnostic.category),
                source: DiagnosticSource::Typescript,
                code: Some(format!("TS{}", diagnostic.code)),
            }
        })
        .collect()
}

fn severity(category: DiagnosticCategory) -> Severity {
    match category {
        DiagnosticCategory::Error => Severity::Error,
        DiagnosticCategory::Warning => Severity::Warning,
        DiagnosticCategory::Suggestion | DiagnosticCategory::Message => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_lang::SEVERITY_WARN;

    fn lint_message(severity: u8, line: Option<u32>, column: Option<u32>) -> LintMessage {
        LintMessage {
            rule_id: Some("semi"),
            severity,
            message: "Missing semicolon.".into(),
            line,
            column,
            fatal: false,
            fix: None,
        }
    }

    fn ts(file: Option<&str>, start: Option<usize>, category: DiagnosticCategory) -> TsDiagnostic {
        TsDiagnostic {
            file: file.map(str::to_owned),
            start,
            length: Some(1),
            message_text: "boom".into(),
            category,
            code: 2322,
        }
    }

    #[test]
    fn eslint_levels_collapse_to_error_or_warning() {
        let diagnostics = eslint(&[
            lint_message(SEVERITY_ERROR, Some(1), Some(8)),
            lint_message(SEVERITY_WARN, None, None),
        ]);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 8));
        assert_eq!(diagnostics[0].code.as_deref(), Some("semi"));
        assert_eq!(diagnostics[1].severity, Severity::Warning);
        assert_eq!((diagnostics[1].line, diagnostics[1].column), (1, 1));
        assert!(diagnostics.iter().all(|d| d.source == DiagnosticSource::Eslint));
    }

    #[test]
    fn typescript_offsets_become_one_based_positions() {
        let mut files = BTreeMap::new();
        files.insert("a.ts".to_owned(), "let a = 1;\nconst n: number = 'x';".to_owned());
        let diagnostics = typescript(
            &[ts(Some("a.ts"), Some(17), DiagnosticCategory::Error)],
            &files,
        );
        assert_eq!(diagnostics[0].file.as_deref(), Some("a.ts"));
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 7));
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2322"));
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn positions_resolve_through_unnormalized_request_keys() {
        let mut files = BTreeMap::new();
        files.insert("./src\\a.ts".to_owned(), "let a = 1;\nconst n: number = 'x';".to_owned());
        let diagnostics = typescript(
            &[ts(Some("src/a.ts"), Some(17), DiagnosticCategory::Error)],
            &files,
        );
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 7));
    }

    #[test]
    fn project_level_diagnostics_default_to_origin() {
        let files = BTreeMap::new();
        let diagnostics = typescript(
            &[
                ts(None, None, DiagnosticCategory::Error),
                ts(Some("gone.ts"), Some(40), DiagnosticCategory::Message),
            ],
            &files,
        );
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 1));
        assert!(diagnostics[0].file.is_none());
        assert_eq!((diagnostics[1].line, diagnostics[1].column), (1, 1));
        assert_eq!(diagnostics[1].severity, Severity::Info);
    }
}
