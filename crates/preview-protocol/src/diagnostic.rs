//! Canonical diagnostic shape.
//!
//! Every tool's native output is converted into [`Diagnostic`] before it
//! leaves the sandbox worker. Diagnostics are never stored; each check call
//! returns a fresh, complete set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Producing tool identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSource {
    Eslint,
    Typescript,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Originating file; set for project-wide checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-indexed.
    pub line: u32,
    /// 1-indexed.
    pub column: u32,
    pub message: String,
    pub severity: Severity,
    pub source: DiagnosticSource,
    /// Tool-specific rule or error code (`semi`, `TS2322`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_serializes_lowercase_enums_and_omits_empty_fields() {
        let diagnostic = Diagnostic {
            file: None,
            line: 1,
            column: 7,
            message: "Missing semicolon.".into(),
            severity: Severity::Error,
            source: DiagnosticSource::Eslint,
            code: None,
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["source"], "eslint");
        assert!(json.get("file").is_none());
        assert!(json.get("code").is_none());
    }
}
