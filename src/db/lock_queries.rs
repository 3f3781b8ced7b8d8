use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::store::StoreError;

/// Take the job's run lock. A live lock is never overwritten; an expired one
/// is replaced in the same statement. Returns whether a row was written.
pub async fn try_acquire_lock(
    pool: &PgPool,
    job_id: i64,
    locked_by: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO schedule_locks (job_id, locked_by, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (job_id) DO UPDATE
            SET locked_by = EXCLUDED.locked_by,
                expires_at = EXCLUDED.expires_at
            WHERE schedule_locks.expires_at <= NOW()
        "#,
    )
    .bind(job_id)
    .bind(locked_by)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether a non-expired lock exists for the job
pub async fn is_locked(pool: &PgPool, job_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM schedule_locks WHERE job_id = $1 AND expires_at > $2
        ) AS locked
        "#,
    )
    .bind(job_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("locked")?)
}

/// Drop the job's lock regardless of holder
pub async fn release_lock(pool: &PgPool, job_id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM schedule_locks WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(())
}
