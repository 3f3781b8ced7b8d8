use async_trait::async_trait;
use serde_json::{json, Value};

use super::{HandlerError, JobHandler};
use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;

/// Stand-in for job types whose work is not built yet. Succeeds with a
/// `not_implemented` marker so the job's bookkeeping still advances.
pub struct NotImplementedHandler;

#[async_trait]
impl JobHandler for NotImplementedHandler {
    async fn run(&self, job: &ScheduleJob, _execution: &JobExecution) -> Result<Value, HandlerError> {
        tracing::warn!(job_id = job.id, job_type = %job.job_type, "Handler not implemented yet");
        Ok(json!({
            "status": "not_implemented",
            "job_type": job.job_type,
        }))
    }
}
