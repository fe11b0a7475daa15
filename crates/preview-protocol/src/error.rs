//! Error taxonomy for the preview engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sandbox::ToolKind;

/// Errors surfaced by session, file store, and sandbox operations.
///
/// Every variant is deterministic for a given input except `TimedOut`, and
/// none of them is retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreviewError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session expired: {0}")]
    SessionExpired(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("nothing to undo: {0}")]
    NothingToUndo(String),
    #[error("nothing to redo: {0}")]
    NothingToRedo(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("format error: {0}")]
    Format(String),
    #[error("lint error: {0}")]
    Lint(String),
    #[error("typecheck error: {0}")]
    Typecheck(String),
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),
    #[error("sandbox request timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },
}

/// Stable, serializable discriminant of [`PreviewError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionNotFound,
    SessionExpired,
    FileNotFound,
    NothingToUndo,
    NothingToRedo,
    GenerationError,
    FormatError,
    LintError,
    TypecheckError,
    SandboxViolation,
    TimedOut,
}

impl PreviewError {
    /// The tool-specific failure variant for `tool`.
    pub fn for_tool(tool: ToolKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match tool {
            ToolKind::Format => Self::Format(message),
            ToolKind::Lint => Self::Lint(message),
            ToolKind::Typecheck => Self::Typecheck(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::SessionExpired(_) => ErrorKind::SessionExpired,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::NothingToUndo(_) => ErrorKind::NothingToUndo,
            Self::NothingToRedo(_) => ErrorKind::NothingToRedo,
            Self::Generation(_) => ErrorKind::GenerationError,
            Self::Format(_) => ErrorKind::FormatError,
            Self::Lint(_) => ErrorKind::LintError,
            Self::Typecheck(_) => ErrorKind::TypecheckError,
            Self::SandboxViolation(_) => ErrorKind::SandboxViolation,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }
}

/// Convenience result type for preview operations.
pub type PreviewResult<T> = Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let kind = PreviewError::NothingToUndo("a.ts".into()).kind();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"nothing_to_undo\"");
    }

    #[test]
    fn for_tool_picks_matching_variant() {
        let error = PreviewError::for_tool(ToolKind::Typecheck, "bad options");
        assert_eq!(error, PreviewError::Typecheck("bad options".into()));
        assert_eq!(error.kind(), ErrorKind::TypecheckError);
    }

    #[test]
    fn timed_out_message_carries_budget() {
        let error = PreviewError::TimedOut { timeout_ms: 250 };
        assert_eq!(error.kind(), ErrorKind::TimedOut);
        assert!(error.to_string().contains("250 ms"));
    }
}
