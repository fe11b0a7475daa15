mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use preview_protocol::{PreviewError, PreviewResult, SessionId};
use preview_store::FileStore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use session::Session;

/// Inactivity window after which a session is gone.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RuntimeConfig {
    pub fn ttl(&self) -> TimeDelta {
        TimeDelta::from_std(self.session_ttl).unwrap_or(TimeDelta::MAX)
    }
}

/// Process-wide session table.
///
/// Lookups share a read lock and refresh the session's access time while
/// holding it, so a sweep (which needs the write lock) can never remove a
/// session between its liveness check and its touch.
#[derive(Debug)]
pub struct SessionManager {
    config: RuntimeConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl SessionManager {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Creates a session owning `files`. Fails with a generation error when
    /// the file set is empty or has unusable paths.
    pub fn create<P, C>(
        &self,
        project_name: impl Into<String>,
        files: impl IntoIterator<Item = (P, C)>,
    ) -> PreviewResult<Arc<Session>>
    where
        P: AsRef<str>,
        C: Into<String>,
    {
        self.create_at(project_name, files, Utc::now())
    }

    pub fn create_at<P, C>(
        &self,
        project_name: impl Into<String>,
        files: impl IntoIterator<Item = (P, C)>,
        now: DateTime<Utc>,
    ) -> PreviewResult<Arc<Session>>
    where
        P: AsRef<str>,
        C: Into<String>,
    {
        let store = FileStore::from_snapshot(files)?;
        let session = Arc::new(Session::new(
            SessionId::generate(),
            project_name.into(),
            store,
            now,
        ));
        self.sessions
            .write()
            .insert(session.id().clone(), Arc::clone(&session));
        info!(
            session_id = %session.id(),
            project = session.project_name(),
            files = session.total_files(),
            "session created"
        );
        Ok(session)
    }

    /// Looks up a live session and refreshes its access time.
    pub fn get(&self, id: &SessionId) -> PreviewResult<Arc<Session>> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &SessionId, now: DateTime<Utc>) -> PreviewResult<Arc<Session>> {
        self.lookup(id, now, true)
    }

    /// Looks up a live session without refreshing it.
    pub fn peek(&self, id: &SessionId) -> PreviewResult<Arc<Session>> {
        self.peek_at(id, Utc::now())
    }

    pub fn peek_at(&self, id: &SessionId, now: DateTime<Utc>) -> PreviewResult<Arc<Session>> {
        self.lookup(id, now, false)
    }

    pub fn touch(&self, id: &SessionId) -> PreviewResult<()> {
        self.get(id).map(|_| ())
    }

    fn lookup(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
        touch: bool,
    ) -> PreviewResult<Arc<Session>> {
        let ttl = self.config.ttl();
        {
            let sessions = self.sessions.read();
            let session = sessions
                .get(id)
                .ok_or_else(|| PreviewError::SessionNotFound(id.to_string()))?;
            if !session.is_expired(now, ttl) {
                if touch {
                    session.touch(now);
                }
                return Ok(Arc::clone(session));
            }
        }

        let mut sessions = self.sessions.write();
        if sessions
            .get(id)
            .is_some_and(|session| session.is_expired(now, ttl))
        {
            sessions.remove(id);
            info!(session_id = %id, "session expired");
        }
        Err(PreviewError::SessionExpired(id.to_string()))
    }

    /// Removes every expired session and returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.ttl();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, ttl));
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "swept expired sessions");
        } else {
            debug!(remaining = sessions.len(), "session sweep found nothing");
        }
        removed
    }

    /// Removes a session regardless of its age.
    pub fn destroy(&self, id: &SessionId) -> PreviewResult<()> {
        match self.sessions.write().remove(id) {
            Some(_) => {
                info!(session_id = %id, "session destroyed");
                Ok(())
            }
            None => Err(PreviewError::SessionNotFound(id.to_string())),
        }
    }

    /// Drops every session; used on shutdown.
    pub fn destroy_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.sessions.write());
        info!(sessions = drained.len(), "all sessions destroyed");
        drained.len()
    }

    /// Runs [`SessionManager::sweep`] every `sweep_interval` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = manager.config.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep();
            }
        })
    }
}
