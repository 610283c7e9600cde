//! HTTP client for the agent's API.
//!
//! Lets orchestration code submit commands, poll for results, and cancel
//! jobs without hand-rolling requests. All calls authenticate with the
//! configured bearer token except `health`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::models::{
    ErrorResponse, ExecuteRequest, ExecuteResponse, HealthResponse, Job, JobListResponse,
    JobStatus,
};

/// Client for one agent endpoint.
pub struct AgentClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl AgentClient {
    /// Create a client for `base_url`, authenticating with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    /// Submit a command for execution; returns the admission response.
    pub async fn execute(&self, req: &ExecuteRequest) -> Result<ExecuteResponse> {
        let resp = self
            .http
            .post(format!("{}/api/v1/commands", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .context("failed to send execute request")?;
        decode(resp).await
    }

    /// Fetch the full record of one job.
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let resp = self
            .http
            .get(format!("{}/api/v1/commands/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to send get request")?;
        decode(resp).await
    }

    /// List jobs with an optional status filter and paging.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<JobListResponse> {
        let mut query: Vec<(&str, String)> = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339()));
        }

        let resp = self
            .http
            .get(format!("{}/api/v1/commands", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .await
            .context("failed to send list request")?;
        decode(resp).await
    }

    /// Cancel a queued or running job.
    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/api/v1/commands/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to send cancel request")?;

        if resp.status() != StatusCode::OK {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    /// Fetch the agent's health counters.
    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("failed to send health request")?;
        decode(resp).await
    }

    /// Poll a job until it reaches a terminal status. A zero `poll_interval`
    /// defaults to one second.
    pub async fn wait_for_job(&self, job_id: &str, poll_interval: Duration) -> Result<Job> {
        let interval = if poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            poll_interval
        };

        loop {
            tokio::time::sleep(interval).await;
            let job = self.get_job(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
        }
    }

    /// Submit a command and wait for its terminal record.
    pub async fn execute_and_wait(
        &self,
        req: &ExecuteRequest,
        poll_interval: Duration,
    ) -> Result<Job> {
        let resp = self.execute(req).await?;
        self.wait_for_job(&resp.job_id, poll_interval).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if resp.status() != StatusCode::OK {
        return Err(error_from(resp).await);
    }
    resp.json().await.context("failed to decode response")
}

/// Turn a failing response into a readable error, preferring the agent's
/// own `{error, message}` body over the bare status code.
async fn error_from(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) if !body.message.is_empty() => {
            anyhow!("{} ({status}): {}", body.error, body.message)
        }
        Ok(body) => anyhow!("{} ({status})", body.error),
        Err(_) => anyhow!("request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = AgentClient::new("http://127.0.0.1:16000/", "k").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:16000");
    }
}
