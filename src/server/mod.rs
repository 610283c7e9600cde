//! HTTP surface for the agent.
//!
//! Endpoints:
//! - POST   /api/v1/commands          - submit a command for execution
//! - GET    /api/v1/commands/{job_id} - fetch one job record
//! - GET    /api/v1/commands          - list jobs with filters and paging
//! - DELETE /api/v1/commands/{job_id} - cancel a queued or running job
//! - GET    /health                   - liveness counters, unauthenticated
//!
//! All `/api/v1` routes require `Authorization: Bearer <token>`. Handlers
//! translate requests into executor calls and executor errors into the
//! `{error, message}` body every failing endpoint returns.

mod auth;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::executor::{Executor, ExecutorError};
use crate::models::{
    ErrorResponse, ExecuteRequest, ExecuteResponse, HealthResponse, Job, JobListResponse,
    JobStatus, SystemInfo,
};

pub use auth::{authorize, AuthError};

/// Shared server state.
pub struct AppState {
    pub executor: Executor,
    pub api_keys: Vec<String>,
    pub version: String,
    pub started: Instant,
}

impl AppState {
    pub fn new(executor: Executor, api_keys: Vec<String>, version: impl Into<String>) -> Self {
        Self {
            executor,
            api_keys,
            version: version.into(),
            started: Instant::now(),
        }
    }
}

/// Error reply: status code plus the standard error body.
type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error, message)))
}

/// Build the agent's router. Authentication guards the `/api/v1` routes;
/// `/health` stays open.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/commands",
            axum::routing::post(execute_command).get(list_commands),
        )
        .route(
            "/commands/{job_id}",
            get(get_command).delete(cancel_command),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

// === Handlers ===

async fn execute_command(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        api_error(
            StatusCode::BAD_REQUEST,
            "Invalid request format",
            rejection.body_text(),
        )
    })?;

    if req.command.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing required field",
            "Command field is required",
        ));
    }

    let job = state.executor.execute(req).map_err(|err| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Execution failed",
            err.to_string(),
        )
    })?;

    Ok(Json(ExecuteResponse {
        job_id: job.id,
        status: job.status,
        created_at: job.created_at,
        command: job.command,
        message: "Command queued successfully".into(),
    }))
}

async fn get_command(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    if job_id.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing job ID",
            "Job ID parameter is required",
        ));
    }

    match state.executor.get_job(&job_id) {
        Ok(job) => Ok(Json(job)),
        Err(_) => Err(api_error(
            StatusCode::NOT_FOUND,
            "Job not found",
            format!("Job with ID {job_id} not found"),
        )),
    }
}

/// Raw query parameters for the list endpoint. Kept as strings so garbage
/// values fall back to defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    since: Option<String>,
}

/// Parse a numeric query parameter; parse failures and negative values give
/// the default, and `max > 0` clamps the result.
fn parse_query_param(param: Option<&str>, default: usize, max: usize) -> usize {
    let value = match param.and_then(|p| p.parse::<i64>().ok()) {
        Some(v) if v >= 0 => v as usize,
        _ => default,
    };
    if max > 0 && value > max {
        max
    } else {
        value
    }
}

async fn list_commands(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let limit = parse_query_param(params.limit.as_deref(), 50, 500);
    let offset = parse_query_param(params.offset.as_deref(), 0, 0);

    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => match JobStatus::from_str(s) {
            Some(status) => Some(status),
            // An unknown status matches no job.
            None => {
                return Ok(Json(JobListResponse {
                    commands: Vec::new(),
                    total: 0,
                    limit,
                    offset,
                }))
            }
        },
    };

    // An unparseable since is treated as absent, not as an error.
    let since = params
        .since
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    let (jobs, total) = state
        .executor
        .list_jobs(status, limit, offset, since)
        .map_err(|err| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list jobs",
                err.to_string(),
            )
        })?;

    Ok(Json(JobListResponse {
        commands: jobs,
        total,
        limit,
        offset,
    }))
}

async fn cancel_command(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if job_id.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing job ID",
            "Job ID parameter is required",
        ));
    }

    match state.executor.cancel(&job_id) {
        Ok(()) => Ok(Json(serde_json::json!({
            "job_id": job_id,
            "status": "cancelled",
            "message": "Command cancelled successfully",
        }))),
        Err(err @ ExecutorError::NotFound) => Err(api_error(
            StatusCode::NOT_FOUND,
            "Cannot cancel job",
            err.to_string(),
        )),
        Err(err @ ExecutorError::InvalidState(_)) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Cannot cancel job",
            err.to_string(),
        )),
        Err(err) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cannot cancel job",
            err.to_string(),
        )),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.executor.stats();

    Json(HealthResponse {
        status: "healthy".into(),
        version: state.version.clone(),
        uptime_seconds: state.started.elapsed().as_secs(),
        running_jobs: stats.running,
        completed_jobs: stats.completed,
        system: SystemInfo {
            memory_usage_mb: memory_usage_mb(),
        },
    })
}

/// Resident set size in MiB, best effort; 0 where unavailable.
fn memory_usage_mb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        return kb / 1024;
                    }
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AgentClient;
    use crate::store::MemoryStore;
    use std::time::Duration;

    const TEST_KEY: &str = "test-key";

    async fn start_server(max_concurrent: usize) -> String {
        let store = Arc::new(MemoryStore::new());
        let executor = Executor::new(max_concurrent, 1800, store);
        let state = Arc::new(AppState::new(executor, vec![TEST_KEY.into()], "test"));
        let app = router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> AgentClient {
        AgentClient::new(base_url, TEST_KEY).unwrap()
    }

    fn execute_request(command: &str, args: &[&str]) -> ExecuteRequest {
        ExecuteRequest {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    const POLL: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn health_is_unauthenticated() {
        let base = start_server(2).await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: HealthResponse = resp.json().await.unwrap();
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, "test");
        assert_eq!(body.running_jobs, 0);
    }

    #[tokio::test]
    async fn api_requires_authorization_header() {
        let base = start_server(2).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}/api/v1/commands"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Authorization header required");
    }

    #[tokio::test]
    async fn api_rejects_wrong_scheme_and_unknown_key() {
        let base = start_server(2).await;
        let http = reqwest::Client::new();

        let resp = http
            .get(format!("{base}/api/v1/commands"))
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Bearer token required");

        let resp = http
            .get(format!("{base}/api/v1/commands"))
            .header("Authorization", "Bearer wrong-key")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Invalid API key");
    }

    #[tokio::test]
    async fn execute_then_poll_converges_to_completed() {
        let base = start_server(2).await;
        let client = client(&base);

        let resp = client
            .execute(&execute_request("echo", &["hi"]))
            .await
            .unwrap();
        assert!(!resp.job_id.is_empty());
        assert_eq!(resp.status, JobStatus::Queued);
        assert_eq!(resp.command, "echo");
        assert_eq!(resp.message, "Command queued successfully");

        let job = client.wait_for_job(&resp.job_id, POLL).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.exit_code, Some(0));
        assert_eq!(job.stdout, "hi\n");
        assert_eq!(job.stderr, "");
    }

    #[tokio::test]
    async fn execute_rejects_bad_bodies() {
        let base = start_server(2).await;
        let http = reqwest::Client::new();

        // malformed JSON
        let resp = http
            .post(format!("{base}/api/v1/commands"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Invalid request format");

        // missing command field
        let resp = http
            .post(format!("{base}/api/v1/commands"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .json(&serde_json::json!({"args": ["hi"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        // explicitly empty command
        let resp = http
            .post(format!("{base}/api/v1/commands"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .json(&serde_json::json!({"command": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Missing required field");
    }

    #[tokio::test]
    async fn get_unknown_job_is_not_found() {
        let base = start_server(2).await;
        let http = reqwest::Client::new();

        let resp = http
            .get(format!("{base}/api/v1/commands/no-such-id"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error, "Job not found");
    }

    #[tokio::test]
    async fn list_applies_lenient_query_parsing() {
        let base = start_server(2).await;
        let client = client(&base);
        let http = reqwest::Client::new();

        let resp = client
            .execute(&execute_request("echo", &["one"]))
            .await
            .unwrap();
        client.wait_for_job(&resp.job_id, POLL).await.unwrap();

        // garbage limit/offset fall back to defaults
        let resp = http
            .get(format!(
                "{base}/api/v1/commands?limit=bogus&offset=-3&since=not-a-time"
            ))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: JobListResponse = resp.json().await.unwrap();
        assert_eq!(body.limit, 50);
        assert_eq!(body.offset, 0);
        assert_eq!(body.total, 1);

        // limit above the max is clamped
        let resp = http
            .get(format!("{base}/api/v1/commands?limit=9999"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        let body: JobListResponse = resp.json().await.unwrap();
        assert_eq!(body.limit, 500);

        // status filter
        let list = client
            .list_jobs(Some(JobStatus::Completed), 10, 0, None)
            .await
            .unwrap();
        assert_eq!(list.total, 1);
        let list = client
            .list_jobs(Some(JobStatus::Failed), 10, 0, None)
            .await
            .unwrap();
        assert_eq!(list.total, 0);

        // unknown status matches nothing
        let resp = http
            .get(format!("{base}/api/v1/commands?status=bogus"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        let body: JobListResponse = resp.json().await.unwrap();
        assert_eq!(body.total, 0);
        assert!(body.commands.is_empty());
    }

    #[tokio::test]
    async fn cancel_flow_over_http() {
        let base = start_server(2).await;
        let client = client(&base);
        let http = reqwest::Client::new();

        let resp = client
            .execute(&execute_request("sleep", &["60"]))
            .await
            .unwrap();

        // wait for the job to start
        for _ in 0..100 {
            let job = client.get_job(&resp.job_id).await.unwrap();
            if job.status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        client.cancel_job(&resp.job_id).await.unwrap();

        let job = client.wait_for_job(&resp.job_id, POLL).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        // cancelling a terminal job is a 400
        let resp2 = http
            .delete(format!("{base}/api/v1/commands/{}", resp.job_id))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp2.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp2.json().await.unwrap();
        assert_eq!(body.error, "Cannot cancel job");

        // cancelling an unknown job is a 404
        let resp3 = http
            .delete(format!("{base}/api/v1/commands/no-such-id"))
            .header("Authorization", format!("Bearer {TEST_KEY}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp3.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[test]
    fn query_param_parsing() {
        assert_eq!(parse_query_param(None, 50, 500), 50);
        assert_eq!(parse_query_param(Some("10"), 50, 500), 10);
        assert_eq!(parse_query_param(Some("-1"), 50, 500), 50);
        assert_eq!(parse_query_param(Some("abc"), 50, 500), 50);
        assert_eq!(parse_query_param(Some("9999"), 50, 500), 500);
        assert_eq!(parse_query_param(Some("9999"), 0, 0), 9999);
    }
}
