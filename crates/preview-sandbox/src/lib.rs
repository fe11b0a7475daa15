//! Sandbox executor for format, lint, and typecheck requests.
//!
//! The server side holds a [`SandboxPool`] of isolated [`Worker`]s; the
//! worker side runs [`handle_request`], either on a pool thread or in a
//! child process driven by [`worker::serve`]. Native tool output is turned
//! into canonical diagnostics by [`normalize`] before it leaves the worker.

pub mod backend;
pub mod handler;
pub mod normalize;
pub mod pool;
pub mod worker;

pub use backend::{ProcessBackend, ThreadBackend, Worker, WorkerBackend};
pub use handler::handle_request;
pub use pool::{Invocation, InvocationState, PoolStats, SandboxLimits, SandboxPool};
