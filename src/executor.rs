//! Job executor: bounded-concurrency, cancellable process supervision.
//!
//! The executor owns the lifecycle of every admitted job:
//! - Admission persists a `queued` record and hands it to a supervisor task.
//! - One supervisor task per job acquires a semaphore slot, registers a
//!   cancel handle, spawns the process, drains stdout/stderr concurrently,
//!   and reconciles process exit with the cancellation or timeout cause.
//! - The cancel table maps job id to the cancel handle of every in-flight
//!   job; firing a handle kills the child and unblocks the supervisor.
//!
//! Per-job failures never escape a supervisor. They become terminal records
//! in the store and are visible only via query.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ExecuteRequest, Job, JobStatus};
use crate::store::JobStore;

/// Errors surfaced by executor operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("job not found")]
    NotFound,

    #[error("job cannot be cancelled (status: {0})")]
    InvalidState(JobStatus),

    #[error("failed to save job: {0}")]
    Store(anyhow::Error),

    #[error("shutdown deadline exceeded with jobs still running")]
    ShutdownTimeout,
}

/// Job totals by status, derived from the store.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Bounded-concurrency supervisor for command jobs.
///
/// At most `max_concurrent` jobs run simultaneously; admission itself is
/// unbounded, so excess jobs wait in `queued` until a slot frees up. The
/// handle is cheap to clone and shares one executor.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    semaphore: Semaphore,
    default_timeout: u64,
    cancel_table: Mutex<HashMap<String, CancellationToken>>,
}

impl Executor {
    /// Create an executor with the given concurrency ceiling and default
    /// per-job timeout in seconds.
    pub fn new(max_concurrent: usize, default_timeout: u64, store: Arc<dyn JobStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                semaphore: Semaphore::new(max_concurrent),
                default_timeout,
                cancel_table: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Admit a job: persist a `queued` record and hand it to a background
    /// supervisor. Returns the record as admitted.
    ///
    /// Admission is non-blocking with respect to the concurrency ceiling.
    pub fn execute(&self, req: ExecuteRequest) -> Result<Job, ExecutorError> {
        let timeout = if req.timeout == 0 {
            self.inner.default_timeout
        } else {
            req.timeout
        };
        let priority = if req.priority.is_empty() {
            "normal".to_string()
        } else {
            req.priority
        };

        let job = Job {
            id: Uuid::new_v4().to_string(),
            command: req.command,
            args: req.args,
            working_dir: req.working_dir,
            env: req.env,
            timeout,
            priority,
            tags: req.tags,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: String::new(),
            duration_ms: 0,
        };

        self.inner
            .store
            .save(job.clone())
            .map_err(ExecutorError::Store)?;

        let inner = Arc::clone(&self.inner);
        let admitted = job.clone();
        tokio::spawn(async move { inner.supervise(admitted).await });

        Ok(job)
    }

    /// Fetch a snapshot of a job record.
    pub fn get_job(&self, id: &str) -> Result<Job, ExecutorError> {
        self.inner.store.get(id).ok_or(ExecutorError::NotFound)
    }

    /// Cancel a queued or running job.
    ///
    /// For a running job this fires its cancel handle, which kills the child;
    /// for a queued job there is no handle yet and the record alone is
    /// finished, so the supervisor observes the terminal status at slot
    /// acquisition and exits without spawning.
    pub fn cancel(&self, id: &str) -> Result<(), ExecutorError> {
        // The table lock serializes this check-and-write against the
        // supervisor's state transitions and against concurrent cancels of
        // the same job.
        let mut table = self.inner.cancel_table.lock();

        let mut job = self.inner.store.get(id).ok_or(ExecutorError::NotFound)?;
        if job.status.is_terminal() {
            return Err(ExecutorError::InvalidState(job.status));
        }

        if let Some(token) = table.remove(id) {
            token.cancel();
        }

        let now = Utc::now();
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        if let Some(started) = job.started_at {
            job.duration_ms = (now - started).num_milliseconds();
        }
        self.inner.store.save(job).map_err(ExecutorError::Store)
    }

    /// List jobs; pure pass-through to the store.
    pub fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Job>, usize), ExecutorError> {
        self.inner
            .store
            .list(status, limit, offset, since)
            .map_err(ExecutorError::Store)
    }

    /// Job totals by status.
    pub fn stats(&self) -> ExecutorStats {
        let store = &self.inner.store;
        ExecutorStats {
            total: store.count(),
            queued: store.count_by_status(JobStatus::Queued),
            running: store.count_by_status(JobStatus::Running),
            completed: store.count_by_status(JobStatus::Completed),
            failed: store.count_by_status(JobStatus::Failed),
            cancelled: store.count_by_status(JobStatus::Cancelled),
        }
    }

    /// Cancel all in-flight jobs and wait for the store to drain, polling
    /// until no job is `running` or the deadline expires.
    ///
    /// Callers must stop accepting new admissions first; shutdown does not
    /// reject them itself.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ExecutorError> {
        let tokens: Vec<CancellationToken> =
            self.inner.cancel_table.lock().values().cloned().collect();
        for token in tokens {
            token.cancel();
        }

        let drained = async {
            while self.inner.store.count_by_status(JobStatus::Running) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(deadline, drained)
            .await
            .map_err(|_| ExecutorError::ShutdownTimeout)
    }
}

impl Inner {
    /// Supervisor for one admitted job, from slot acquisition to terminal
    /// status. The permit guard releases the slot on every exit path.
    async fn supervise(self: Arc<Self>, mut job: Job) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return;
        };

        let cancel = CancellationToken::new();
        let started = Utc::now();

        // Re-check, register, and write the running transition as one step
        // under the cancel-table lock. The cancel path holds the same lock
        // across its own check-and-write, so a cancel can land only before
        // the re-check (the supervisor exits here) or after the token is
        // registered (the token fires); it can never be overwritten by this
        // `running` write. A terminal record is never resurrected.
        {
            let mut table = self.cancel_table.lock();
            match self.store.get(&job.id) {
                Some(current) if current.status.is_terminal() => return,
                Some(current) => job = current,
                None => return,
            }
            table.insert(job.id.clone(), cancel.clone());

            job.status = JobStatus::Running;
            job.started_at = Some(started);
            if let Err(err) = self.store.save(job.clone()) {
                warn!(job_id = %job.id, error = %err, "failed to persist running transition");
            }
        }
        debug!(job_id = %job.id, command = %job.command, "job started");

        run_command(&mut job, &cancel).await;

        let completed = Utc::now();
        job.completed_at = Some(completed);
        job.duration_ms = (completed - started).num_milliseconds();

        // Finalize under the cancel-table lock so this write is serialized
        // against the cancel path. Terminal status wins: a `cancelled` the
        // cancel path wrote while the process was unwinding is adopted, not
        // overwritten.
        {
            let mut table = self.cancel_table.lock();
            if let Some(current) = self.store.get(&job.id) {
                if current.status == JobStatus::Cancelled && job.status != JobStatus::Cancelled {
                    job.status = JobStatus::Cancelled;
                    job.error = "command cancelled".into();
                }
            }
            if let Err(err) = self.store.save(job.clone()) {
                warn!(job_id = %job.id, error = %err, "failed to persist terminal status");
            }
            table.remove(&job.id);
        }

        info!(
            job_id = %job.id,
            status = %job.status,
            duration_ms = job.duration_ms,
            "job finished"
        );
    }
}

/// Run the job's process to completion and record the outcome on the record.
///
/// Both pipes are drained by concurrent reader tasks before the exit status
/// is interpreted. The cause check at the end is final: a timeout or
/// cancellation observed on the token overrides whatever the child reported,
/// including a clean exit in the race window between signal delivery and
/// natural exit.
async fn run_command(job: &mut Job, cancel: &CancellationToken) {
    let mut cmd = Command::new(&job.command);
    cmd.args(&job.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if !job.working_dir.is_empty() {
        cmd.current_dir(&job.working_dir);
    }

    // A non-empty env replaces the inherited environment entirely.
    if !job.env.is_empty() {
        cmd.env_clear();
        cmd.envs(&job.env);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            job.status = JobStatus::Failed;
            job.error = format!("failed to start command: {err}");
            job.exit_code = Some(-1);
            return;
        }
    };

    let stdout_task = capture(child.stdout.take());
    let stderr_task = capture(child.stderr.take());

    let mut timed_out = false;
    let mut cancelled = false;
    let wait_result = tokio::select! {
        result = child.wait() => result,
        _ = cancel.cancelled() => {
            cancelled = true;
            let _ = child.start_kill();
            child.wait().await
        }
        _ = tokio::time::sleep(Duration::from_secs(job.timeout)) => {
            timed_out = true;
            let _ = child.start_kill();
            child.wait().await
        }
    };

    job.stdout = stdout_task.await.unwrap_or_default();
    job.stderr = stderr_task.await.unwrap_or_default();

    match wait_result {
        Ok(status) if status.success() => {
            job.status = JobStatus::Completed;
            job.exit_code = Some(0);
        }
        Ok(status) => {
            job.status = JobStatus::Failed;
            job.error = describe_exit(status);
            job.exit_code = Some(status.code().unwrap_or(-1));
        }
        Err(err) => {
            job.status = JobStatus::Failed;
            job.error = format!("failed to wait for command: {err}");
            job.exit_code = Some(-1);
        }
    }

    if timed_out {
        job.status = JobStatus::Failed;
        job.error = "command timed out".into();
        if job.stderr.is_empty() {
            job.stderr = "Command execution timed out".into();
        }
    } else if cancelled || cancel.is_cancelled() {
        job.status = JobStatus::Cancelled;
        job.error = "command cancelled".into();
        if job.stderr.is_empty() {
            job.stderr = "Command execution cancelled".into();
        }
    }
}

/// Drain one pipe to the end on a reader task, so the child cannot deadlock
/// on a full pipe buffer while the supervisor waits on it.
fn capture<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Render an exit status the way a shell would report it.
fn describe_exit(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("process terminated by signal {signal}");
        }
    }
    match status.code() {
        Some(code) => format!("process exited with status {code}"),
        None => "process exited abnormally".to_string(),
    }
}
