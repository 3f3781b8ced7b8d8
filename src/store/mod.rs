//! Persistence boundary of the scheduler core.
//!
//! The poll loop, lock manager and execution recorder only talk to the
//! database through [`ScheduleStore`]. [`PgScheduleStore`] is the production
//! implementation; [`MemoryScheduleStore`] keeps the same semantics in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;

pub mod memory;
pub mod postgres;

pub use memory::MemoryScheduleStore;
pub use postgres::PgScheduleStore;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Jobs with `is_active = true AND status = 'active'`, highest priority first.
    async fn load_active_jobs(&self) -> Result<Vec<ScheduleJob>, StoreError>;

    /// Set `next_run_at = last_run_at + interval` for every interval-based job.
    async fn refresh_next_run_times(&self) -> Result<u64, StoreError>;

    /// Insert the lock row, or take over an expired one. Returns whether this
    /// caller now holds the lock. Never waits.
    async fn try_acquire_lock(
        &self,
        job_id: i64,
        locked_by: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Whether a lock row for the job exists with `expires_at > now`.
    async fn is_locked(&self, job_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Unconditionally delete the job's lock row.
    async fn release_lock(&self, job_id: i64) -> Result<(), StoreError>;

    /// Insert a running execution row and return its id.
    async fn insert_execution(
        &self,
        job_id: i64,
        started_at: DateTime<Utc>,
        parameters: &serde_json::Value,
    ) -> Result<i64, StoreError>;

    /// Write the final status, timing, counts and outcome of an execution.
    async fn finalize_execution(&self, execution: &JobExecution) -> Result<(), StoreError>;

    async fn record_job_success(&self, job_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// `error` is expected to be truncated already.
    async fn record_job_failure(
        &self,
        job_id: i64,
        at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid {column} value in row {id}: {value}")]
    Decode {
        id: i64,
        column: &'static str,
        value: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Store unavailable: {0}")]
    Unavailable(&'static str),
}
