use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Advisory run lock held on one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLock {
    pub job_id: i64,
    pub locked_by: String,
    pub expires_at: DateTime<Utc>,
}

impl JobLock {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
