mod generator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use preview_protocol::{
    DiffView, FailureKind, FileView, FormatOutput, FormatRequest, LintOutput, LintRequest,
    PreviewError, PreviewResult, SandboxRequest, SandboxResponse, SessionId, SessionStatus,
    SessionSummary, ToolKind, TreeNode, TypecheckOutput, TypecheckRequest,
};
use preview_runtime::{RuntimeConfig, Session, SessionManager};
use preview_sandbox::{PoolStats, SandboxLimits, SandboxPool, ThreadBackend, WorkerBackend};
use preview_store::archive;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

pub use generator::{GeneratedProject, ProjectGenerator, SnapshotGenerator};

#[derive(Clone)]
pub struct KernelBuilder {
    runtime: RuntimeConfig,
    limits: SandboxLimits,
    backend: Arc<dyn WorkerBackend>,
    generator: Arc<dyn ProjectGenerator>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            limits: SandboxLimits::default(),
            backend: Arc::new(ThreadBackend),
            generator: Arc::new(SnapshotGenerator),
        }
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.runtime.session_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.runtime.sweep_interval = interval;
        self
    }

    pub fn sandbox_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn WorkerBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ProjectGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn build(self) -> PreviewKernel {
        info!(
            backend = self.backend.name(),
            workers = self.limits.workers,
            timeout_ms = self.limits.timeout_ms,
            session_ttl_secs = self.runtime.session_ttl.as_secs(),
            "preview kernel configured"
        );
        PreviewKernel {
            sessions: Arc::new(SessionManager::new(self.runtime)),
            sandbox: Arc::new(SandboxPool::new(self.backend, self.limits)),
            generator: self.generator,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }
}

/// Zip export of a session.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PreviewKernel {
    sessions: Arc<SessionManager>,
    sandbox: Arc<SandboxPool>,
    generator: Arc<dyn ProjectGenerator>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PreviewKernel {
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sandbox_stats(&self) -> PoolStats {
        self.sandbox.stats()
    }

    pub fn session_ttl(&self) -> Duration {
        self.sessions.config().session_ttl
    }

    /// Starts the background TTL sweep. Calling it again is a no-op.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(self.sessions.spawn_sweeper());
        }
    }

    /// Stops the sweeper, drops every session, and closes the sandbox pool.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        let sessions = self.sessions.destroy_all();
        self.sandbox.shutdown();
        info!(sessions, "preview kernel shut down");
    }

    #[instrument(skip(self, config))]
    pub async fn create_session(&self, config: &Value) -> PreviewResult<SessionSummary> {
        let project = self.generator.generate(config).await?;
        let session = self.sessions.create(project.project_name, project.files)?;
        Ok(session.summary())
    }

    /// Status does not count as activity, so polling it never keeps a
    /// session alive.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn session_status(&self, session_id: &SessionId) -> PreviewResult<SessionStatus> {
        let session = self.sessions.peek(session_id)?;
        Ok(session.status(self.sessions.config().ttl()))
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn destroy_session(&self, session_id: &SessionId) -> PreviewResult<()> {
        self.sessions.destroy(session_id)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn tree(&self, session_id: &SessionId) -> PreviewResult<Vec<TreeNode>> {
        Ok(self.session(session_id)?.files().tree())
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn read_file(&self, session_id: &SessionId, path: &str) -> PreviewResult<FileView> {
        self.session(session_id)?.files().read(path)
    }

    #[instrument(skip(self, content), fields(session_id = %session_id, bytes = content.len()))]
    pub fn save_file(
        &self,
        session_id: &SessionId,
        path: &str,
        content: String,
    ) -> PreviewResult<FileView> {
        self.session(session_id)?.files().save(path, content)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn diff(&self, session_id: &SessionId, path: &str) -> PreviewResult<DiffView> {
        self.session(session_id)?.files().diff(path)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn unified_diff(&self, session_id: &SessionId, path: &str) -> PreviewResult<String> {
        self.session(session_id)?.files().unified_diff(path)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn undo(&self, session_id: &SessionId, path: &str) -> PreviewResult<FileView> {
        self.session(session_id)?.files().undo(path)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn redo(&self, session_id: &SessionId, path: &str) -> PreviewResult<FileView> {
        self.session(session_id)?.files().redo(path)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn reset(&self, session_id: &SessionId, path: &str) -> PreviewResult<FileView> {
        self.session(session_id)?.files().reset(path)
    }

    #[instrument(skip(self, request), fields(language = %request.language, bytes = request.code.len()))]
    pub async fn format(&self, request: FormatRequest) -> PreviewResult<FormatOutput> {
        match self.run(SandboxRequest::Format(request)).await? {
            SandboxResponse::Format(output) => Ok(output),
            other => Err(unexpected(ToolKind::Format, &other)),
        }
    }

    #[instrument(skip(self, request), fields(file_path = %request.file_path, fix = request.fix))]
    pub async fn lint(&self, request: LintRequest) -> PreviewResult<LintOutput> {
        match self.run(SandboxRequest::Lint(request)).await? {
            SandboxResponse::Lint(output) => Ok(output),
            other => Err(unexpected(ToolKind::Lint, &other)),
        }
    }

    /// Type-checks the session's current files as one project.
    #[instrument(skip(self, compiler_options), fields(session_id = %session_id))]
    pub async fn typecheck(
        &self,
        session_id: &SessionId,
        compiler_options: Option<Value>,
    ) -> PreviewResult<TypecheckOutput> {
        let files = self.session(session_id)?.files().snapshot();
        let request = SandboxRequest::Typecheck(TypecheckRequest {
            files,
            compiler_options,
        });
        match self.run(request).await? {
            SandboxResponse::Typecheck(output) => Ok(output),
            other => Err(unexpected(ToolKind::Typecheck, &other)),
        }
    }

    /// Zip archive of the session's current files. Session errors come back
    /// as [`PreviewError`] inside the `anyhow::Error`.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn download(&self, session_id: &SessionId) -> Result<Download> {
        let session = self.session(session_id)?;
        let root = archive::root_name(session.project_name());
        let bytes = session.files().archive(session.project_name())?;
        info!(bytes = bytes.len(), "session archived");
        Ok(Download {
            file_name: format!("{root}.zip"),
            bytes,
        })
    }

    fn session(&self, session_id: &SessionId) -> PreviewResult<Arc<Session>> {
        self.sessions.get(session_id)
    }

    async fn run(&self, request: SandboxRequest) -> PreviewResult<SandboxResponse> {
        let tool = request.tool();
        match self.sandbox.execute(request).await? {
            SandboxResponse::Failure(failure) => Err(match failure.kind {
                FailureKind::Violation => PreviewError::SandboxViolation(failure.message),
                FailureKind::Tool | FailureKind::Panic => {
                    PreviewError::for_tool(tool, failure.message)
                }
            }),
            response => Ok(response),
        }
    }
}

fn unexpected(tool: ToolKind, response: &SandboxResponse) -> PreviewError {
    PreviewError::for_tool(tool, format!("unexpected sandbox response: {response:?}"))
}
