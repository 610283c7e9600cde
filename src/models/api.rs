//! Request and response types for the agent's HTTP API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, JobStatus};

/// Request to execute a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Executable name or path. Required.
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory; empty inherits the agent's cwd.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    /// Process environment; a non-empty map replaces the inherited one.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Wall-clock timeout in seconds; 0 means the configured default.
    #[serde(default)]
    pub timeout: u64,
    /// Advisory priority label; empty defaults to "normal".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,
    /// Opaque metadata echoed back in queries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Response to a successful execute request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub command: String,
    pub message: String,
}

/// Page of jobs returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub commands: Vec<Job>,
    /// Count after filtering, before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Process-level gauges reported by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub memory_usage_mb: u64,
}

/// Response to a health check. No real checks are performed; the agent
/// reports "healthy" plus counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub system: SystemInfo,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Build an error body from the short cause and the detail message.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_request_defaults_optional_fields() {
        let req: ExecuteRequest = serde_json::from_str(r#"{"command":"echo"}"#).unwrap();
        assert_eq!(req.command, "echo");
        assert!(req.args.is_empty());
        assert_eq!(req.timeout, 0);
        assert!(req.priority.is_empty());
    }

    #[test]
    fn execute_request_requires_command() {
        let result = serde_json::from_str::<ExecuteRequest>(r#"{"args":["hi"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn error_response_omits_absent_code() {
        let body = ErrorResponse::new("Job not found", "Job with ID x not found");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("code").is_none());
        assert_eq!(json["error"], "Job not found");
    }
}
