//! Isolated execution contexts.
//!
//! A [`Worker`] accepts one request at a time and answers with one response.
//! Only owned messages cross into it: the thread backend moves them over
//! channels, the process backend serializes them over stdio. Dropping a
//! worker tears its context down.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use preview_protocol::{SandboxRequest, SandboxResponse, WorkerEnvelope, WorkerReply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::debug;

use crate::handler::handle_request;

#[async_trait]
pub trait Worker: Send {
    fn id(&self) -> u64;

    /// Sends one request and waits for its response. An `Err` means the
    /// transport failed and the worker must not be reused.
    async fn call(&mut self, request: SandboxRequest) -> Result<SandboxResponse>;
}

#[async_trait]
pub trait WorkerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn spawn(&self, id: u64) -> Result<Box<dyn Worker>>;
}

type Job = (SandboxRequest, oneshot::Sender<SandboxResponse>);

/// Runs each worker on a dedicated OS thread.
///
/// A hung thread cannot be killed; once its worker is discarded the thread
/// is detached and exits after its current request, if ever.
#[derive(Debug, Clone, Default)]
pub struct ThreadBackend;

#[async_trait]
impl WorkerBackend for ThreadBackend {
    fn name(&self) -> &'static str {
        "thread"
    }

    async fn spawn(&self, id: u64) -> Result<Box<dyn Worker>> {
        let (jobs, inbox) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(format!("preview-sandbox-{id}"))
            .spawn(move || {
                while let Ok((request, reply)) = inbox.recv() {
                    let _ = reply.send(handle_request(request));
                }
            })
            .context("failed to start sandbox thread")?;
        debug!(worker = id, "spawned thread worker");
        Ok(Box::new(ThreadWorker { id, jobs }))
    }
}

struct ThreadWorker {
    id: u64,
    jobs: mpsc::Sender<Job>,
}

#[async_trait]
impl Worker for ThreadWorker {
    fn id(&self) -> u64 {
        self.id
    }

    async fn call(&mut self, request: SandboxRequest) -> Result<SandboxResponse> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send((request, reply))
            .map_err(|_| anyhow!("sandbox thread {} has exited", self.id))?;
        response
            .await
            .map_err(|_| anyhow!("sandbox thread {} dropped the request", self.id))
    }
}

/// Runs each worker as a child process speaking JSON lines on stdio.
///
/// Children start with a cleared environment (plus `env`) and are killed
/// when their worker is dropped.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    /// Re-runs the current executable with `args`, which must select its
    /// worker entry point.
    pub fn current_exe(args: Vec<String>) -> Result<Self> {
        let program = std::env::current_exe().context("failed to locate current executable")?;
        Ok(Self::new(program, args))
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl WorkerBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn spawn(&self, id: u64) -> Result<Box<dyn Worker>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;
        let stdin = child.stdin.take().context("worker stdin unavailable")?;
        let stdout = child.stdout.take().context("worker stdout unavailable")?;
        debug!(worker = id, pid = child.id(), "spawned process worker");
        Ok(Box::new(ProcessWorker {
            id,
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_message: 0,
        }))
    }
}

struct ProcessWorker {
    id: u64,
    // Killed on drop.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_message: u64,
}

#[async_trait]
impl Worker for ProcessWorker {
    fn id(&self) -> u64 {
        self.id
    }

    async fn call(&mut self, request: SandboxRequest) -> Result<SandboxResponse> {
        self.next_message += 1;
        let envelope = WorkerEnvelope {
            id: self.next_message,
            request,
        };
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let Some(line) = self.stdout.next_line().await? else {
            bail!("sandbox process {} closed its output", self.id);
        };
        let reply: WorkerReply =
            serde_json::from_str(&line).context("malformed reply from sandbox process")?;
        if reply.id != envelope.id {
            bail!(
                "sandbox process {} answered message {} while {} was pending",
                self.id,
                reply.id,
                envelope.id
            );
        }
        Ok(reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_protocol::{FormatOutput, FormatRequest};

    #[tokio::test]
    async fn thread_worker_answers_requests_in_turn() -> Result<()> {
        let mut worker = ThreadBackend.spawn(7).await?;
        assert_eq!(worker.id(), 7);
        for _ in 0..2 {
            let response = worker
                .call(SandboxRequest::Format(FormatRequest {
                    code: "{\"b\":1}".into(),
                    language: "json".into(),
                }))
                .await?;
            assert_eq!(
                response,
                SandboxResponse::Format(FormatOutput {
                    formatted: "{\n  \"b\": 1\n}\n".into()
                })
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let backend = ProcessBackend::new("/nonexistent/preview-worker", vec!["worker".into()]);
        assert!(backend.spawn(1).await.is_err());
    }
}
