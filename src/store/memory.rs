//! In-memory job store.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::JobStore;
use crate::models::{Job, JobStatus};

/// In-memory implementation of [`JobStore`].
///
/// Whole-record replacement is the update discipline: `save` swaps the entire
/// record under the write lock, so readers never observe a partially-updated
/// job.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn save(&self, job: Job) -> Result<()> {
        self.jobs.write().insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Job>, usize)> {
        let jobs = self.jobs.read();
        let mut filtered: Vec<Job> = jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .filter(|job| since.is_none_or(|t| job.created_at >= t))
            .cloned()
            .collect();
        drop(jobs);

        let total = filtered.len();
        if offset > 0 {
            if offset >= filtered.len() {
                return Ok((Vec::new(), total));
            }
            filtered.drain(..offset);
        }
        if limit > 0 && filtered.len() > limit {
            filtered.truncate(limit);
        }

        Ok((filtered, total))
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.jobs.write().remove(id);
        Ok(())
    }

    fn count(&self) -> usize {
        self.jobs.read().len()
    }

    fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|job| job.status == status)
            .count()
    }

    fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.created_at < cutoff));
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, command: &str, status: JobStatus, created_at: DateTime<Utc>) -> Job {
        Job {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: String::new(),
            env: HashMap::new(),
            timeout: 1800,
            priority: "normal".into(),
            tags: HashMap::new(),
            status,
            created_at,
            started_at: None,
            completed_at: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: String::new(),
            duration_ms: 0,
        }
    }

    #[test]
    fn save_get_delete() {
        let store = MemoryStore::new();
        store
            .save(job("test-job-1", "echo", JobStatus::Queued, Utc::now()))
            .unwrap();

        let retrieved = store.get("test-job-1").unwrap();
        assert_eq!(retrieved.id, "test-job-1");
        assert_eq!(retrieved.command, "echo");
        assert!(store.get("non-existent").is_none());

        assert_eq!(store.count(), 1);
        assert_eq!(store.count_by_status(JobStatus::Queued), 1);
        assert_eq!(store.count_by_status(JobStatus::Completed), 0);

        store.delete("test-job-1").unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.get("test-job-1").is_none());
        // delete is idempotent
        store.delete("test-job-1").unwrap();
    }

    #[test]
    fn save_is_an_upsert() {
        let store = MemoryStore::new();
        let mut j = job("job-1", "echo", JobStatus::Queued, Utc::now());
        store.save(j.clone()).unwrap();

        j.status = JobStatus::Completed;
        j.exit_code = Some(0);
        store.save(j).unwrap();

        assert_eq!(store.count(), 1);
        let stored = store.get("job-1").unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.exit_code, Some(0));
    }

    #[test]
    fn list_filters_and_pagination() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save(job("job-1", "echo", JobStatus::Completed, now - Duration::hours(2)))
            .unwrap();
        store
            .save(job("job-2", "sleep", JobStatus::Running, now - Duration::hours(1)))
            .unwrap();
        store
            .save(job("job-3", "ls", JobStatus::Completed, now))
            .unwrap();

        let assert_list = |status, limit, offset, since, expected_total, expected_len| {
            let (items, total) = store.list(status, limit, offset, since).unwrap();
            assert_eq!(total, expected_total);
            assert_eq!(items.len(), expected_len);
        };

        // pagination
        assert_list(None, 2, 0, None, 3, 2);
        // offset
        assert_list(None, 2, 1, None, 3, 2);
        // offset past the end
        assert_list(None, 10, 5, None, 3, 0);
        // status filter
        assert_list(Some(JobStatus::Completed), 10, 0, None, 2, 2);
        assert_list(Some(JobStatus::Failed), 10, 0, None, 0, 0);
        // since filter
        let since = now - Duration::minutes(30);
        assert_list(None, 10, 0, Some(since), 1, 1);
        let (items, _) = store.list(None, 10, 0, Some(since)).unwrap();
        assert_eq!(items[0].id, "job-3");
        // limit 0 means unlimited
        assert_list(None, 0, 0, None, 3, 3);
    }

    #[test]
    fn cleanup_removes_only_old_terminal_jobs() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save(job("old-job", "echo", JobStatus::Completed, now - Duration::hours(25)))
            .unwrap();
        store
            .save(job("recent-job", "echo", JobStatus::Completed, now - Duration::hours(1)))
            .unwrap();
        store
            .save(job("running-job", "sleep", JobStatus::Running, now - Duration::hours(25)))
            .unwrap();

        assert_eq!(store.count(), 3);

        let cleaned = store.cleanup(Duration::hours(24));
        assert_eq!(cleaned, 1);
        assert_eq!(store.count(), 2);

        assert!(store.get("old-job").is_none());
        assert!(store.get("recent-job").is_some());
        assert!(
            store.get("running-job").is_some(),
            "running job should remain regardless of age"
        );
    }

    #[test]
    fn cleanup_with_nothing_old_removes_nothing() {
        let store = MemoryStore::new();
        store
            .save(job("job-1", "echo", JobStatus::Completed, Utc::now()))
            .unwrap();
        assert_eq!(store.cleanup(Duration::hours(1)), 0);
        assert_eq!(store.count(), 1);
    }
}
