//! Session summaries handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Returned by session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub project_name: String,
    pub total_files: usize,
}

/// Liveness and edit state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub project_name: String,
    pub total_files: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// When the session expires if no further request touches it.
    pub expires_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub dirty_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_uses_camel_case() {
        let summary = SessionSummary {
            session_id: SessionId::from_string("S1"),
            project_name: "demo".into(),
            total_files: 3,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["sessionId"], "S1");
        assert_eq!(json["projectName"], "demo");
        assert_eq!(json["totalFiles"], 3);
    }
}
