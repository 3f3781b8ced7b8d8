use chrono::Utc;
use std::sync::Arc;

use super::lock::LockManager;
use super::recorder::ExecutionRecorder;
use crate::handlers::HandlerRegistry;
use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;
use crate::store::ScheduleStore;

/// Runs one attempt of a job: lock, record, invoke the handler, settle
/// counters, release.
#[derive(Clone)]
pub struct JobRunner {
    locks: LockManager,
    recorder: ExecutionRecorder,
    handlers: Arc<HandlerRegistry>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        handlers: Arc<HandlerRegistry>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            locks: LockManager::new(store.clone(), owner),
            recorder: ExecutionRecorder::new(store),
            handlers,
        }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Execute the job once.
    ///
    /// Returns `None` without touching any state when another worker holds
    /// the job's lock. Otherwise returns the settled execution; handler
    /// errors and panics are captured in it rather than propagated.
    pub async fn run(&self, job: ScheduleJob) -> Option<JobExecution> {
        if !self.locks.acquire(&job).await {
            tracing::warn!(job_id = job.id, job_name = %job.name, "Job is locked, skipping");
            metrics::counter!("scheduler_lock_contention_total").increment(1);
            return None;
        }

        let mut execution = self.recorder.start_execution(&job).await;

        tracing::info!(
            job_id = job.id,
            job_name = %job.name,
            job_type = %job.job_type,
            execution_id = execution.id,
            "Starting job"
        );

        // Run the handler in its own task so a panic is reported as a failed
        // execution and the lock below is still released.
        let handlers = self.handlers.clone();
        let handler_job = job.clone();
        let handler_execution = execution.clone();
        let outcome = tokio::spawn(async move {
            handlers.invoke(&handler_job, &handler_execution).await
        })
        .await;

        let outcome = match outcome {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(join_error) => Err(format!("Handler panicked: {join_error}")),
        };

        match outcome {
            Ok(summary) => {
                execution.succeed(summary);
                self.recorder.update_job_success(job.id).await;
            }
            Err(message) => {
                tracing::error!(
                    job_id = job.id,
                    job_type = %job.job_type,
                    execution_id = execution.id,
                    error = %message,
                    "Job failed"
                );
                execution.fail(message.as_str());
                self.recorder.update_job_failure(job.id, &message).await;
            }
        }

        execution.finish(Utc::now());
        self.recorder.complete_execution(&execution).await;
        self.locks.release(job.id).await;

        let duration = execution.duration_seconds.unwrap_or_default();
        metrics::counter!(
            "scheduler_executions_total",
            "job_type" => job.job_type.to_string(),
            "status" => execution.status.to_string()
        )
        .increment(1);
        metrics::histogram!("scheduler_execution_seconds", "job_type" => job.job_type.to_string())
            .record(duration);

        tracing::info!(
            job_id = job.id,
            execution_id = execution.id,
            status = %execution.status,
            duration_seconds = duration,
            records_processed = execution.records_processed,
            "Job finished"
        );

        Some(execution)
    }
}
