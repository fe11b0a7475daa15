//! # preview-lang — in-memory source tooling
//!
//! Formatting, linting, and type checking for TypeScript and JavaScript
//! projects held entirely in memory. Nothing here touches the file system
//! or the network: the type checker reaches files only through a
//! [`FileResolver`], and the sandbox worker is the only intended caller.
//!
//! ## Module Overview
//!
//! - [`lexer`] — `logos` token stream with regex and JSX disambiguation
//! - [`line_index`] — byte offset to line/character conversion
//! - [`syntax`] — bracket pairing, brace classification, statement ends
//! - [`format`] — whitespace and quote normalizing formatter, JSON printer
//! - [`lint`] — eslint-shaped rule engine with fix passes
//! - [`typecheck`] — tsc-shaped project checker

pub mod format;
pub mod lexer;
pub mod line_index;
pub mod lint;
pub mod syntax;
pub mod typecheck;

pub use format::{FormatError, Language, format};
pub use lexer::{Dialect, Token, TokenKind, lex};
pub use line_index::LineIndex;
pub use lint::{Fix, LintError, LintMessage, LintReport, SEVERITY_ERROR, SEVERITY_WARN, lint};
pub use typecheck::{
    CheckError, CompilerOptions, DiagnosticCategory, FileResolver, ResolverError,
    SnapshotResolver, TsDiagnostic, check_project, typecheck,
};
