use serde::{Deserialize, Serialize};

use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;

/// Response after creating or changing a job.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: ScheduleJob,
    pub message: String,
}

/// Response for listing jobs.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<ScheduleJob>,
}

/// Response for a job's execution history.
#[derive(Debug, Serialize)]
pub struct ExecutionHistoryResponse {
    pub job_id: i64,
    pub executions: Vec<JobExecution>,
}

/// Query string for execution history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 200;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}
