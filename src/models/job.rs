//! Job model representing a single command execution and its lifecycle record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is admitted and waiting for an executor slot.
    Queued,
    /// Job's process is currently running.
    Running,
    /// Job's process exited with code 0.
    Completed,
    /// Job failed: nonzero exit, spawn failure, or timeout.
    Failed,
    /// Job was cancelled before or during execution.
    Cancelled,
}

impl JobStatus {
    /// Convert status to its wire string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its wire string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A job is a single command-execution request and everything the agent
/// learned about it: what was asked, when it ran, and how it ended.
///
/// Records are created `queued` on admission. Each record is mutated only by
/// its owning supervisor, plus the cancel path, which writes the terminal
/// fields. Once a record reaches a terminal status it never leaves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for the job, generated server-side.
    #[serde(rename = "job_id")]
    pub id: String,
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory; empty means the agent's own cwd.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    /// Environment for the process; a non-empty map replaces the inherited
    /// environment entirely.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Wall-clock timeout in seconds.
    pub timeout: u64,
    /// Advisory priority label; stored and echoed, never scheduled on.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,
    /// Opaque caller metadata echoed back in queries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Current status.
    pub status: JobStatus,
    /// When the job was admitted.
    pub created_at: DateTime<Utc>,
    /// When the job first transitioned to `running`, if it ever did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Exit code of the reaped process; -1 for pre-spawn failures and
    /// signal deaths. Absent when no process was ever waited on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Full captured stdout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Full captured stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Human-readable failure cause; empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// `completed_at - started_at` in milliseconds; 0 if the job never ran.
    #[serde(default)]
    pub duration_ms: i64,
}
