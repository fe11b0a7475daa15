//! Style and correctness linter producing eslint-shaped messages.

mod rules;

use thiserror::Error;
use tracing::debug;

use crate::lexer::Dialect;
use crate::line_index::LineIndex;
use crate::syntax::analyze;

/// Fix passes before giving up on convergence.
const MAX_FIX_PASSES: usize = 10;

pub const SEVERITY_WARN: u8 = 1;
pub const SEVERITY_ERROR: u8 = 2;

/// Replacement of the byte range `start..end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One linter finding. Positions are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintMessage {
    pub rule_id: Option<&'static str>,
    pub severity: u8,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub fatal: bool,
    pub fix: Option<Fix>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub messages: Vec<LintMessage>,
    /// Source after fixes, present when fixing was requested.
    pub output: Option<String>,
}

impl LintReport {
    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.severity == SEVERITY_ERROR)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LintError {
    #[error("no lint configuration applies to \"{0}\"")]
    UnsupportedFile(String),
}

/// Lints `code` as the file at `file_path`, optionally applying fixes.
pub fn lint(code: &str, file_path: &str, fix: bool) -> Result<LintReport, LintError> {
    let dialect =
        Dialect::from_path(file_path).ok_or_else(|| LintError::UnsupportedFile(file_path.into()))?;

    let mut current = code.to_string();
    if fix {
        let mut passes = 0;
        while passes < MAX_FIX_PASSES {
            let messages = check(&current, dialect);
            if messages.iter().any(|message| message.fatal) {
                break;
            }
            match apply_fixes(&current, &messages) {
                Some(next) if next != current => current = next,
                _ => break,
            }
            passes += 1;
        }
        debug!(file_path, passes, "applied lint fixes");
    }

    let messages = check(&current, dialect);
    Ok(LintReport {
        messages,
        output: fix.then_some(current),
    })
}

/// Runs every rule over `source` once.
pub fn check(source: &str, dialect: Dialect) -> Vec<LintMessage> {
    match analyze(source, dialect) {
        Ok(structure) => {
            let mut messages = rules::run(&structure);
            messages.sort_by_key(|message| (message.line, message.column));
            messages
        }
        Err(error) => {
            let (line, column) = LineIndex::new(source).one_based(error.offset);
            vec![LintMessage {
                rule_id: None,
                severity: SEVERITY_ERROR,
                message: format!("Parsing error: {}", error.message),
                line: Some(line),
                column: Some(column),
                fatal: true,
                fix: None,
            }]
        }
    }
}

/// Applies non-overlapping fixes in source order.
fn apply_fixes(source: &str, messages: &[LintMessage]) -> Option<String> {
    let mut fixes: Vec<&Fix> = messages.iter().filter_map(|m| m.fix.as_ref()).collect();
    if fixes.is_empty() {
        return None;
    }
    fixes.sort_by_key(|fix| (fix.start, fix.end));

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    for fix in fixes {
        if fix.start < cursor || fix.end > source.len() {
            continue;
        }
        output.push_str(&source[cursor..fix.start]);
        output.push_str(&fix.text);
        cursor = fix.end;
    }
    output.push_str(&source[cursor..]);
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_ids(report: &LintReport) -> Vec<&'static str> {
        report
            .messages
            .iter()
            .filter_map(|message| message.rule_id)
            .collect()
    }

    #[test]
    fn missing_semicolon_is_an_error_on_line_one() {
        let report = lint("let x=1", "a.ts", false).unwrap();
        let semi = report
            .messages
            .iter()
            .find(|message| message.rule_id == Some("semi"))
            .unwrap();
        assert_eq!(semi.severity, SEVERITY_ERROR);
        assert_eq!(semi.line, Some(1));
        assert_eq!(semi.column, Some(8));
        assert_eq!(semi.message, "Missing semicolon.");
        assert!(report.output.is_none());
    }

    #[test]
    fn fixes_converge_and_leave_unfixable_messages() {
        let code = "var total = 0\nif (total == 1) {\n  console.log('one')\n}\n";
        let report = lint(code, "src/app.js", true).unwrap();
        assert_eq!(
            report.output.as_deref(),
            Some("const total = 0;\nif (total == 1) {\n  console.log(\"one\");\n}\n")
        );
        assert_eq!(rule_ids(&report), vec!["eqeqeq", "no-console"]);
    }

    #[test]
    fn parse_failure_is_one_fatal_message() {
        let report = lint("function (", "a.js", true).unwrap();
        assert_eq!(report.messages.len(), 1);
        assert!(report.messages[0].fatal);
        assert!(report.messages[0].message.starts_with("Parsing error: "));
        assert_eq!(report.output.as_deref(), Some("function ("));
    }

    #[test]
    fn rejects_unsupported_files() {
        assert_eq!(
            lint("body {}", "style.css", false),
            Err(LintError::UnsupportedFile("style.css".into()))
        );
    }

    #[test]
    fn overlapping_fixes_are_skipped() {
        let messages = vec![
            LintMessage {
                rule_id: Some("a"),
                severity: 1,
                message: String::new(),
                line: None,
                column: None,
                fatal: false,
                fix: Some(Fix {
                    start: 0,
                    end: 3,
                    text: "const".into(),
                }),
            },
            LintMessage {
                rule_id: Some("b"),
                severity: 1,
                message: String::new(),
                line: None,
                column: None,
                fatal: false,
                fix: Some(Fix {
                    start: 0,
                    end: 3,
                    text: "let".into(),
                }),
            },
        ];
        assert_eq!(
            apply_fixes("var a = 1;", &messages).as_deref(),
            Some("const a = 1;")
        );
    }
}
