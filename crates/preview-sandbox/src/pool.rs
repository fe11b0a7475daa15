use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use preview_protocol::{
    FailureKind, PreviewError, PreviewResult, SandboxRequest, SandboxResponse, ToolKind,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{Span, debug, instrument, warn};

use crate::backend::{Worker, WorkerBackend};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub timeout_ms: u64,
    pub workers: usize,
    pub max_input_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            workers: 4,
            max_input_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Idle,
    Dispatched,
    Completed,
    Faulted,
    TimedOut,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Faulted | Self::TimedOut)
    }
}

/// Life of one request: `Idle -> Dispatched -> Completed | Faulted | TimedOut`.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: u64,
    pub tool: ToolKind,
    state: InvocationState,
    dispatched_at: Option<Instant>,
}

impl Invocation {
    pub fn new(id: u64, tool: ToolKind) -> Self {
        Self {
            id,
            tool,
            state: InvocationState::Idle,
            dispatched_at: None,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn dispatch(&mut self) -> bool {
        let moved = self.advance(InvocationState::Idle, InvocationState::Dispatched);
        if moved {
            self.dispatched_at = Some(Instant::now());
        }
        moved
    }

    pub fn complete(&mut self) -> bool {
        self.advance(InvocationState::Dispatched, InvocationState::Completed)
    }

    pub fn fault(&mut self) -> bool {
        self.advance(InvocationState::Dispatched, InvocationState::Faulted)
    }

    pub fn time_out(&mut self) -> bool {
        self.advance(InvocationState::Dispatched, InvocationState::TimedOut)
    }

    /// Time since dispatch, zero before it.
    pub fn elapsed(&self) -> Duration {
        self.dispatched_at.map_or(Duration::ZERO, |at| at.elapsed())
    }

    fn advance(&mut self, from: InvocationState, to: InvocationState) -> bool {
        if self.state != from {
            return false;
        }
        self.state = to;
        true
    }
}

/// Counters since the pool was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub spawned: u64,
    pub discarded: u64,
    pub completed: u64,
    pub faulted: u64,
    pub timed_out: u64,
    pub idle: usize,
}

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    discarded: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
    timed_out: AtomicU64,
}

/// Bounded pool of isolated workers.
///
/// At most `limits.workers` requests run at once. Workers are spawned
/// lazily and reused after a clean response; a worker that times out,
/// breaks its transport, or panics is dropped and never handed out again.
pub struct SandboxPool {
    backend: Arc<dyn WorkerBackend>,
    limits: SandboxLimits,
    permits: Semaphore,
    idle: Mutex<Vec<Box<dyn Worker>>>,
    next_worker: AtomicU64,
    next_invocation: AtomicU64,
    counters: Counters,
}

impl SandboxPool {
    pub fn new(backend: Arc<dyn WorkerBackend>, limits: SandboxLimits) -> Self {
        let workers = limits.workers.max(1);
        Self {
            backend,
            permits: Semaphore::new(workers),
            limits,
            idle: Mutex::new(Vec::with_capacity(workers)),
            next_worker: AtomicU64::new(1),
            next_invocation: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            faulted: self.counters.faulted.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
        }
    }

    /// Runs `request` on a pooled worker.
    ///
    /// The returned response may itself be a [`SandboxResponse::Failure`];
    /// `Err` is reserved for requests that never produced a response:
    /// oversized input, a dead pool, a faulted worker, or a timeout.
    #[instrument(
        skip(self, request),
        fields(tool = %request.tool(), invocation = tracing::field::Empty, worker = tracing::field::Empty)
    )]
    pub async fn execute(&self, request: SandboxRequest) -> PreviewResult<SandboxResponse> {
        let tool = request.tool();
        let size = request.input_bytes();
        if size > self.limits.max_input_bytes {
            return Err(PreviewError::for_tool(
                tool,
                format!(
                    "input of {size} bytes exceeds the {} byte limit",
                    self.limits.max_input_bytes
                ),
            ));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PreviewError::for_tool(tool, "sandbox pool is shut down"))?;

        let mut invocation =
            Invocation::new(self.next_invocation.fetch_add(1, Ordering::Relaxed), tool);
        Span::current().record("invocation", invocation.id);

        let mut worker = self.checkout(tool).await?;
        Span::current().record("worker", worker.id());

        invocation.dispatch();
        let limit = Duration::from_millis(self.limits.timeout_ms.max(1));
        let outcome = timeout(limit, worker.call(request)).await;
        match outcome {
            Ok(Ok(response)) => {
                invocation.complete();
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    elapsed_ms = invocation.elapsed().as_millis() as u64,
                    "sandbox request completed"
                );
                match &response {
                    SandboxResponse::Failure(failure) if failure.kind == FailureKind::Violation => {
                        warn!(
                            target: "preview::security",
                            %tool,
                            message = %failure.message,
                            "sandbox violation"
                        );
                        self.checkin(worker);
                    }
                    SandboxResponse::Failure(failure) if failure.kind == FailureKind::Panic => {
                        warn!(%tool, message = %failure.message, "sandbox tool panicked");
                        self.discard(worker, "panicked");
                    }
                    _ => self.checkin(worker),
                }
                Ok(response)
            }
            Ok(Err(error)) => {
                invocation.fault();
                self.counters.faulted.fetch_add(1, Ordering::Relaxed);
                warn!(%tool, %error, "sandbox worker faulted");
                self.discard(worker, "faulted");
                Err(PreviewError::for_tool(tool, format!("sandbox worker faulted: {error}")))
            }
            Err(_) => {
                invocation.time_out();
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(%tool, timeout_ms = self.limits.timeout_ms, "sandbox request timed out");
                self.discard(worker, "timed out");
                Err(PreviewError::TimedOut {
                    timeout_ms: self.limits.timeout_ms,
                })
            }
        }
    }

    /// Drops idle workers and refuses further requests. In-flight requests
    /// finish normally; their workers are dropped instead of returned.
    pub fn shutdown(&self) {
        self.permits.close();
        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        debug!(workers = drained.len(), "sandbox pool shut down");
    }

    async fn checkout(&self, tool: ToolKind) -> PreviewResult<Box<dyn Worker>> {
        if let Some(worker) = self.idle.lock().pop() {
            return Ok(worker);
        }
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        match self.backend.spawn(id).await {
            Ok(worker) => {
                self.counters.spawned.fetch_add(1, Ordering::Relaxed);
                Ok(worker)
            }
            Err(error) => {
                warn!(%tool, %error, backend = self.backend.name(), "failed to spawn sandbox worker");
                Err(PreviewError::for_tool(
                    tool,
                    format!("sandbox worker unavailable: {error}"),
                ))
            }
        }
    }

    fn checkin(&self, worker: Box<dyn Worker>) {
        if self.permits.is_closed() {
            self.discard(worker, "pool closed");
            return;
        }
        self.idle.lock().push(worker);
    }

    fn discard(&self, worker: Box<dyn Worker>, reason: &'static str) {
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(worker = worker.id(), reason, "discarded sandbox worker");
        drop(worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ThreadBackend;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use preview_protocol::{
        FormatOutput, FormatRequest, LintRequest, SandboxFailure, TypecheckRequest,
    };
    use std::collections::BTreeMap;

    /// Behaviour selected by the request's `code`.
    struct ScriptedBackend;

    struct ScriptedWorker {
        id: u64,
    }

    #[async_trait]
    impl WorkerBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn spawn(&self, id: u64) -> Result<Box<dyn Worker>> {
            Ok(Box::new(ScriptedWorker { id }))
        }
    }

    #[async_trait]
    impl Worker for ScriptedWorker {
        fn id(&self) -> u64 {
            self.id
        }

        async fn call(&mut self, request: SandboxRequest) -> Result<SandboxResponse> {
            let SandboxRequest::Format(FormatRequest { code, .. }) = request else {
                bail!("unsupported");
            };
            match code.as_str() {
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    bail!("woke up");
                }
                "crash" => bail!("transport closed"),
                "panic" => Ok(SandboxResponse::Failure(SandboxFailure::panic("boom"))),
                "violation" => Ok(SandboxResponse::Failure(SandboxFailure::violation("write"))),
                _ => Ok(SandboxResponse::Format(FormatOutput {
                    formatted: format!("{code} from {}", self.id),
                })),
            }
        }
    }

    fn format(code: &str) -> SandboxRequest {
        SandboxRequest::Format(FormatRequest {
            code: code.into(),
            language: "typescript".into(),
        })
    }

    fn scripted(limits: SandboxLimits) -> SandboxPool {
        SandboxPool::new(Arc::new(ScriptedBackend), limits)
    }

    fn formatted(response: SandboxResponse) -> String {
        match response {
            SandboxResponse::Format(output) => output.formatted,
            other => panic!("expected format output, got {other:?}"),
        }
    }

    #[test]
    fn invocation_moves_only_along_its_edges() {
        let mut invocation = Invocation::new(1, ToolKind::Lint);
        assert_eq!(invocation.state(), InvocationState::Idle);
        assert!(!invocation.complete());
        assert!(invocation.dispatch());
        assert!(!invocation.dispatch());
        assert!(invocation.time_out());
        assert!(invocation.state().is_terminal());
        assert!(!invocation.complete());
        assert_eq!(invocation.state(), InvocationState::TimedOut);
    }

    #[tokio::test]
    async fn healthy_workers_are_reused() -> Result<()> {
        let pool = scripted(SandboxLimits::default());
        assert_eq!(formatted(pool.execute(format("a")).await?), "a from 1");
        assert_eq!(formatted(pool.execute(format("b")).await?), "b from 1");
        let stats = pool.stats();
        assert_eq!(stats.spawned, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.idle, 1);
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_worker_is_replaced() -> Result<()> {
        let pool = scripted(SandboxLimits {
            timeout_ms: 50,
            ..SandboxLimits::default()
        });
        let error = pool.execute(format("hang")).await.unwrap_err();
        assert_eq!(error, PreviewError::TimedOut { timeout_ms: 50 });

        assert_eq!(formatted(pool.execute(format("next")).await?), "next from 2");
        let stats = pool.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.spawned, 2);
        Ok(())
    }

    #[tokio::test]
    async fn faulted_and_panicked_workers_are_discarded() -> Result<()> {
        let pool = scripted(SandboxLimits::default());
        let error = pool.execute(format("crash")).await.unwrap_err();
        assert!(matches!(error, PreviewError::Format(message) if message.contains("faulted")));

        let response = pool.execute(format("panic")).await?;
        assert!(!response.is_success());

        assert_eq!(formatted(pool.execute(format("ok")).await?), "ok from 3");
        let stats = pool.stats();
        assert_eq!(stats.faulted, 1);
        assert_eq!(stats.discarded, 2);
        Ok(())
    }

    #[tokio::test]
    async fn violations_are_returned_as_failures() -> Result<()> {
        let pool = scripted(SandboxLimits::default());
        let response = pool.execute(format("violation")).await?;
        assert_eq!(response, SandboxResponse::Failure(SandboxFailure::violation("write")));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_dispatch() {
        let pool = scripted(SandboxLimits {
            max_input_bytes: 4,
            ..SandboxLimits::default()
        });
        let error = pool
            .execute(SandboxRequest::Lint(LintRequest {
                code: "let x = 1;".into(),
                file_path: "a.ts".into(),
                fix: false,
            }))
            .await
            .unwrap_err();
        assert!(matches!(error, PreviewError::Lint(_)));
        assert_eq!(pool.stats().spawned, 0);
    }

    #[tokio::test]
    async fn shut_down_pool_refuses_requests() {
        let pool = scripted(SandboxLimits::default());
        pool.shutdown();
        let error = pool.execute(format("a")).await.unwrap_err();
        assert_eq!(error, PreviewError::Format("sandbox pool is shut down".into()));
    }

    #[tokio::test]
    async fn hung_request_does_not_block_other_workers() -> Result<()> {
        let pool = Arc::new(scripted(SandboxLimits {
            timeout_ms: 300,
            workers: 2,
            ..SandboxLimits::default()
        }));
        let hung = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.execute(format("hang")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        pool.execute(format("quick")).await?;
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(matches!(hung.await?, Err(PreviewError::TimedOut { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn thread_backend_runs_real_tools() -> Result<()> {
        let pool = SandboxPool::new(Arc::new(ThreadBackend), SandboxLimits::default());
        let mut files = BTreeMap::new();
        files.insert("a.ts".to_owned(), "const n: number = 'x';".to_owned());
        let response = pool
            .execute(SandboxRequest::Typecheck(TypecheckRequest {
                files,
                compiler_options: None,
            }))
            .await?;
        let SandboxResponse::Typecheck(output) = response else {
            panic!("expected typecheck output, got {response:?}");
        };
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code.as_deref(), Some("TS2322"));
        Ok(())
    }
}
