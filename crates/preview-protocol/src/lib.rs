//! # preview-protocol — shared contract for the preview engine
//!
//! This crate defines the types that cross every boundary of the preview
//! engine: the HTTP layer, the session kernel, and the sandbox worker
//! boundary. It is intentionally dependency-light (no tokio, no axum) so the
//! sandbox worker can link it without pulling the server stack.
//!
//! ## Module Overview
//!
//! - [`ids`] — `SessionId`
//! - [`error`] — `PreviewError`, `ErrorKind`, `PreviewResult`
//! - [`diagnostic`] — canonical `Diagnostic` shape shared by every tool
//! - [`file`] — tree nodes and per-file views returned to callers
//! - [`path`] — project-relative path normalization
//! - [`sandbox`] — request/response variants exchanged with sandbox workers
//! - [`session`] — session summaries returned to callers

pub mod diagnostic;
pub mod error;
pub mod file;
pub mod ids;
pub mod path;
pub mod sandbox;
pub mod session;

pub use diagnostic::{Diagnostic, DiagnosticSource, Severity};
pub use error::{ErrorKind, PreviewError, PreviewResult};
pub use file::{DiffView, FileView, NodeKind, TreeNode};
pub use ids::SessionId;
pub use session::{SessionStatus, SessionSummary};
pub use sandbox::{
    FailureKind, FormatOutput, FormatRequest, LintOutput, LintRequest, SandboxFailure,
    SandboxRequest, SandboxResponse, ToolKind, TypecheckOutput, TypecheckRequest, WorkerEnvelope,
    WorkerReply,
};
