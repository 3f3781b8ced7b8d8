use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Status of one execution attempt. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// One timed attempt at running a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    /// Zero when the start record could not be persisted.
    pub id: i64,
    pub job_id: i64,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_processed: i64,
    pub error_message: Option<String>,
    pub parameters: serde_json::Value,
    pub result_summary: Option<serde_json::Value>,
}

impl JobExecution {
    pub fn started(id: i64, job_id: i64, started_at: DateTime<Utc>, parameters: serde_json::Value) -> Self {
        Self {
            id,
            job_id,
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            duration_seconds: None,
            records_processed: 0,
            error_message: None,
            parameters,
            result_summary: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn succeed(&mut self, summary: serde_json::Value) {
        self.records_processed = records_in(&summary);
        self.result_summary = Some(summary);
        self.status = ExecutionStatus::Completed;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.status = ExecutionStatus::Failed;
    }

    /// Stamp completion time and derive the duration.
    pub fn finish(&mut self, completed_at: DateTime<Utc>) {
        let elapsed = completed_at.signed_duration_since(self.started_at);
        self.duration_seconds = Some(elapsed.num_milliseconds() as f64 / 1000.0);
        self.completed_at = Some(completed_at);
    }
}

/// Record count reported by a handler, via `records_processed` or `total`.
fn records_in(summary: &serde_json::Value) -> i64 {
    summary
        .get("records_processed")
        .or_else(|| summary.get("total"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}
