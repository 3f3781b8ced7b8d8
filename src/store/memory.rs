use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ScheduleStore, StoreError};
use crate::models::execution::JobExecution;
use crate::models::job::{truncate_error, JobStatus, ScheduleJob};
use crate::models::lock::JobLock;

#[derive(Default)]
struct State {
    jobs: BTreeMap<i64, ScheduleJob>,
    executions: BTreeMap<i64, JobExecution>,
    locks: HashMap<i64, JobLock>,
    next_job_id: i64,
    next_execution_id: i64,
    execution_writes_fail: bool,
}

/// In-process [`ScheduleStore`] with the same lock and bookkeeping semantics
/// as the Postgres tables. Every operation is atomic under one mutex.
#[derive(Default)]
pub struct MemoryScheduleStore {
    state: Mutex<State>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a job, assigning an id when `job.id` is zero.
    pub fn insert_job(&self, mut job: ScheduleJob) -> i64 {
        let mut state = self.state();
        if job.id <= 0 {
            state.next_job_id += 1;
            job.id = state.next_job_id;
        } else {
            state.next_job_id = state.next_job_id.max(job.id);
        }
        let id = job.id;
        state.jobs.insert(id, job);
        id
    }

    pub fn job(&self, job_id: i64) -> Option<ScheduleJob> {
        self.state().jobs.get(&job_id).cloned()
    }

    pub fn update_job(&self, job_id: i64, f: impl FnOnce(&mut ScheduleJob)) {
        if let Some(job) = self.state().jobs.get_mut(&job_id) {
            f(job);
        }
    }

    /// Executions of a job, oldest first.
    pub fn executions_for(&self, job_id: i64) -> Vec<JobExecution> {
        self.state()
            .executions
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn lock_for(&self, job_id: i64) -> Option<JobLock> {
        self.state().locks.get(&job_id).cloned()
    }

    /// Plant a lock row directly, e.g. one left behind by a crashed worker.
    pub fn put_lock(&self, lock: JobLock) {
        self.state().locks.insert(lock.job_id, lock);
    }

    /// Make execution inserts and updates fail, simulating a database outage.
    pub fn set_execution_writes_failing(&self, failing: bool) {
        self.state().execution_writes_fail = failing;
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load_active_jobs(&self) -> Result<Vec<ScheduleJob>, StoreError> {
        let mut jobs: Vec<ScheduleJob> = self
            .state()
            .jobs
            .values()
            .filter(|j| j.is_active && j.status == JobStatus::Active)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn refresh_next_run_times(&self) -> Result<u64, StoreError> {
        let mut updated = 0;
        for job in self.state().jobs.values_mut() {
            if !job.is_active || job.status != JobStatus::Active {
                continue;
            }
            if let (Some(interval), Some(last_run_at)) = (job.interval, job.last_run_at) {
                job.next_run_at = Some(last_run_at + interval.duration());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn try_acquire_lock(
        &self,
        job_id: i64,
        locked_by: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut state = self.state();
        if let Some(existing) = state.locks.get(&job_id) {
            if existing.is_live(now) {
                return Ok(false);
            }
        }
        state.locks.insert(
            job_id,
            JobLock {
                job_id,
                locked_by: locked_by.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn is_locked(&self, job_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .locks
            .get(&job_id)
            .is_some_and(|lock| lock.is_live(now)))
    }

    async fn release_lock(&self, job_id: i64) -> Result<(), StoreError> {
        self.state().locks.remove(&job_id);
        Ok(())
    }

    async fn insert_execution(
        &self,
        job_id: i64,
        started_at: DateTime<Utc>,
        parameters: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        let mut state = self.state();
        if state.execution_writes_fail {
            return Err(StoreError::Unavailable("job_executions"));
        }
        state.next_execution_id += 1;
        let id = state.next_execution_id;
        state.executions.insert(
            id,
            JobExecution::started(id, job_id, started_at, parameters.clone()),
        );
        Ok(id)
    }

    async fn finalize_execution(&self, execution: &JobExecution) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.execution_writes_fail {
            return Err(StoreError::Unavailable("job_executions"));
        }
        if let Some(row) = state.executions.get_mut(&execution.id) {
            *row = execution.clone();
        }
        Ok(())
    }

    async fn record_job_success(&self, job_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.run_count += 1;
        job.success_count += 1;
        job.last_run_at = Some(at);
        job.last_success_at = Some(at);
        job.last_error = None;
        Ok(())
    }

    async fn record_job_failure(
        &self,
        job_id: i64,
        at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.run_count += 1;
        job.error_count += 1;
        job.last_run_at = Some(at);
        job.last_error = Some(truncate_error(error));
        Ok(())
    }
}
