use crate::error::{PortalError, Result};
use crate::types::LogType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only execution log entry attached to a task. Entries are never
/// rewritten once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: u64,
    pub task_id: u64,
    pub project_id: u64,
    pub log_type: LogType,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// What a caller submits; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default = "default_log_type")]
    pub log_type: LogType,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn default_log_type() -> LogType {
    LogType::Note
}

impl LogEntry {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            log_type: LogType::Note,
            note: text.into(),
            payload: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.note.trim().is_empty() && self.payload.is_none() {
            return Err(PortalError::Validation(
                "a log entry needs a note or a payload".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_log(
        self,
        id: u64,
        task_id: u64,
        project_id: u64,
        author: &str,
        now: DateTime<Utc>,
    ) -> ExecutionLog {
        ExecutionLog {
            id,
            task_id,
            project_id,
            log_type: self.log_type,
            note: self.note,
            payload: self.payload,
            author: author.to_string(),
            created_at: now,
        }
    }
}
