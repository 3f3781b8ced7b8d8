use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ScheduleStore, StoreError};
use crate::db::{execution_queries, job_queries, lock_queries};
use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;

/// [`ScheduleStore`] backed by the shared Postgres pool.
#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn load_active_jobs(&self) -> Result<Vec<ScheduleJob>, StoreError> {
        job_queries::list_active_jobs(&self.pool).await
    }

    async fn refresh_next_run_times(&self) -> Result<u64, StoreError> {
        job_queries::refresh_next_run_times(&self.pool).await
    }

    async fn try_acquire_lock(
        &self,
        job_id: i64,
        locked_by: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        lock_queries::try_acquire_lock(&self.pool, job_id, locked_by, expires_at).await
    }

    async fn is_locked(&self, job_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        lock_queries::is_locked(&self.pool, job_id, now).await
    }

    async fn release_lock(&self, job_id: i64) -> Result<(), StoreError> {
        lock_queries::release_lock(&self.pool, job_id).await
    }

    async fn insert_execution(
        &self,
        job_id: i64,
        started_at: DateTime<Utc>,
        parameters: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        execution_queries::insert_execution(&self.pool, job_id, started_at, parameters).await
    }

    async fn finalize_execution(&self, execution: &JobExecution) -> Result<(), StoreError> {
        execution_queries::finalize_execution(&self.pool, execution).await
    }

    async fn record_job_success(&self, job_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        job_queries::mark_job_success(&self.pool, job_id, at).await
    }

    async fn record_job_failure(
        &self,
        job_id: i64,
        at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        job_queries::mark_job_failure(&self.pool, job_id, at, error).await
    }
}
