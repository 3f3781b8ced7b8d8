use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::models::job::ScheduleJob;
use crate::store::ScheduleStore;

const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: Duration = Duration::from_millis(250);

/// Per-job advisory lock on top of `schedule_locks`.
///
/// The row is the only mutual-exclusion primitive, so it holds across
/// scheduler processes sharing the database.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn ScheduleStore>,
    owner: String,
}

impl LockManager {
    pub fn new(store: Arc<dyn ScheduleStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    /// `scheduler-<pid>`, the holder name written to lock rows.
    pub fn process_owner() -> String {
        format!("scheduler-{}", std::process::id())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Try to take the job's lock for `timeout_minutes`. Never waits; a
    /// database error counts as not acquired.
    pub async fn acquire(&self, job: &ScheduleJob) -> bool {
        let expires_at = Utc::now() + job.lock_ttl();
        match self.store.try_acquire_lock(job.id, &self.owner, expires_at).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Lock acquisition failed");
                false
            }
        }
    }

    /// Whether a live (non-expired) lock exists. On error the job is treated
    /// as unlocked and left to [`acquire`](Self::acquire) to decide.
    pub async fn is_locked(&self, job_id: i64) -> bool {
        match self.store.is_locked(job_id, Utc::now()).await {
            Ok(locked) => locked,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Lock check failed");
                false
            }
        }
    }

    /// Delete the lock row, retrying with doubling back-off. If every attempt
    /// fails the row stays until its TTL passes.
    pub async fn release(&self, job_id: i64) {
        let mut backoff = RELEASE_BACKOFF;
        for attempt in 1..=RELEASE_ATTEMPTS {
            match self.store.release_lock(job_id).await {
                Ok(()) => return,
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    tracing::warn!(job_id, attempt, error = %e, "Lock release failed, retrying");
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    tracing::error!(
                        job_id,
                        error = %e,
                        "Lock release failed; lock will be reclaimed after it expires"
                    );
                }
            }
        }
    }
}
