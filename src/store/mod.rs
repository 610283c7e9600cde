//! Job storage: the state of record for every job the agent has seen.
//!
//! The store is deliberately dumb. It performs no schema validation and
//! enforces no state machine; the executor owns transitions and the store
//! just persists whole records. Readers always receive snapshots, never
//! references into shared state.

mod memory;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::models::{Job, JobStatus};

pub use memory::MemoryStore;

/// Storage backend for job records.
///
/// All operations are safe under concurrent callers. The in-memory backend
/// cannot fail; the fallible signatures exist for future alternate backends.
pub trait JobStore: Send + Sync {
    /// Insert or replace a record by id. Idempotent.
    fn save(&self, job: Job) -> Result<()>;

    /// Fetch a snapshot of a record.
    fn get(&self, id: &str) -> Option<Job>;

    /// List jobs, optionally filtered by exact status and by
    /// `created_at >= since`. Returns the requested page and the total count
    /// after filtering, before pagination. `limit == 0` means unlimited.
    fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Job>, usize)>;

    /// Remove a record. Idempotent.
    fn delete(&self, id: &str) -> Result<()>;

    /// Total number of records.
    fn count(&self) -> usize;

    /// Number of records with the given status.
    fn count_by_status(&self, status: JobStatus) -> usize;

    /// Remove terminal jobs created more than `max_age` ago. Returns the
    /// number of records removed.
    fn cleanup(&self, max_age: Duration) -> usize;
}
