//! Messages exchanged with sandbox workers.
//!
//! Requests and responses are owned, immutable values. They are moved (or
//! serialized) across the isolation boundary; no reference to caller-owned
//! data ever reaches a worker.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Format,
    Lint,
    Typecheck,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Format => "format",
            Self::Lint => "lint",
            Self::Typecheck => "typecheck",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintRequest {
    pub code: String,
    pub file_path: String,
    #[serde(default)]
    pub fix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypecheckRequest {
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "input", rename_all = "snake_case")]
pub enum SandboxRequest {
    Format(FormatRequest),
    Lint(LintRequest),
    Typecheck(TypecheckRequest),
}

impl SandboxRequest {
    pub fn tool(&self) -> ToolKind {
        match self {
            Self::Format(_) => ToolKind::Format,
            Self::Lint(_) => ToolKind::Lint,
            Self::Typecheck(_) => ToolKind::Typecheck,
        }
    }

    /// Total bytes of source text carried by the request.
    pub fn input_bytes(&self) -> usize {
        match self {
            Self::Format(request) => request.code.len(),
            Self::Lint(request) => request.code.len(),
            Self::Typecheck(request) => request
                .files
                .iter()
                .map(|(path, content)| path.len() + content.len())
                .sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOutput {
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOutput {
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypecheckOutput {
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool rejected its input (parse error, unknown parser, bad options).
    Tool,
    /// The tool attempted disk or network access.
    Violation,
    /// The tool panicked inside the worker.
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SandboxFailure {
    pub fn tool(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Tool,
            message: message.into(),
        }
    }

    pub fn violation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Violation,
            message: message.into(),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "output", rename_all = "snake_case")]
pub enum SandboxResponse {
    Format(FormatOutput),
    Lint(LintOutput),
    Typecheck(TypecheckOutput),
    Failure(SandboxFailure),
}

impl SandboxResponse {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }
}

/// Stdio framing for process workers: one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    pub id: u64,
    pub request: SandboxRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub id: u64,
    pub response: SandboxResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_tagged_by_tool() {
        let request = SandboxRequest::Lint(LintRequest {
            code: "let x=1".into(),
            file_path: "a.ts".into(),
            fix: false,
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tool"], "lint");
        assert_eq!(json["input"]["filePath"], "a.ts");
        assert_eq!(request.tool(), ToolKind::Lint);
    }

    #[test]
    fn typecheck_input_bytes_counts_paths_and_contents() {
        let mut files = BTreeMap::new();
        files.insert("a.ts".to_owned(), "let x = 1;".to_owned());
        let request = SandboxRequest::Typecheck(TypecheckRequest {
            files,
            compiler_options: None,
        });
        assert_eq!(request.input_bytes(), 4 + 10);
    }

    #[test]
    fn failure_response_is_not_success() {
        let response = SandboxResponse::Failure(SandboxFailure::panic("boom"));
        assert!(!response.is_success());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["tool"], "failure");
        assert_eq!(json["output"]["kind"], "panic");
    }
}
