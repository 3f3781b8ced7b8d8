use chrono::Utc;
use std::sync::Arc;

use crate::models::execution::JobExecution;
use crate::models::job::{truncate_error, ScheduleJob};
use crate::store::ScheduleStore;

/// Writes execution history and job run counters. Persistence failures are
/// logged and never abort the job run.
#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn ScheduleStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// Open a running execution. The returned id is 0 if the row could not
    /// be written.
    pub async fn start_execution(&self, job: &ScheduleJob) -> JobExecution {
        let started_at = Utc::now();
        let id = match self
            .store
            .insert_execution(job.id, started_at, &job.parameters)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Failed to record execution start");
                0
            }
        };

        JobExecution::started(id, job.id, started_at, job.parameters.clone())
    }

    pub async fn complete_execution(&self, execution: &JobExecution) {
        if !execution.is_persisted() {
            tracing::warn!(
                job_id = execution.job_id,
                status = %execution.status,
                "Execution was never recorded; outcome not persisted"
            );
            return;
        }

        if let Err(e) = self.store.finalize_execution(execution).await {
            tracing::error!(
                job_id = execution.job_id,
                execution_id = execution.id,
                error = %e,
                "Failed to record execution outcome"
            );
        }
    }

    pub async fn update_job_success(&self, job_id: i64) {
        if let Err(e) = self.store.record_job_success(job_id, Utc::now()).await {
            tracing::error!(job_id, error = %e, "Failed to update job success counters");
        }
    }

    pub async fn update_job_failure(&self, job_id: i64, error: &str) {
        let error = truncate_error(error);
        if let Err(e) = self.store.record_job_failure(job_id, Utc::now(), &error).await {
            tracing::error!(job_id, error = %e, "Failed to update job failure counters");
        }
    }
}
