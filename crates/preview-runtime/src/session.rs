use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use preview_protocol::{SessionId, SessionStatus, SessionSummary};
use preview_store::FileStore;

/// One preview session: generation metadata plus the files it owns.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    project_name: String,
    total_files: usize,
    created_at: DateTime<Utc>,
    last_accessed_at: Mutex<DateTime<Utc>>,
    files: FileStore,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        project_name: String,
        files: FileStore,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_name,
            total_files: files.len(),
            created_at: now,
            last_accessed_at: Mutex::new(now),
            files,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// File count at creation time.
    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        *self.last_accessed_at.lock()
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Moves the access clock forward to `now`. Never moves it back.
    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        let mut last = self.last_accessed_at.lock();
        if now > *last {
            *last = now;
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.last_accessed_at() > ttl
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            project_name: self.project_name.clone(),
            total_files: self.total_files,
        }
    }

    pub fn status(&self, ttl: TimeDelta) -> SessionStatus {
        let last_accessed_at = self.last_accessed_at();
        SessionStatus {
            session_id: self.id.clone(),
            project_name: self.project_name.clone(),
            total_files: self.total_files,
            created_at: self.created_at,
            last_accessed_at,
            expires_at: last_accessed_at + ttl,
            ttl_secs: u64::try_from(ttl.num_seconds()).unwrap_or(0),
            dirty_files: self.files.dirty_paths(),
        }
    }
}
