use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use crate::models::job::{
    parse_specific_time, truncate_error, JobStatus, JobType, NewScheduleJob, ScheduleInterval,
    ScheduleJob,
};
use crate::store::StoreError;

const JOB_COLUMNS: &str = r#"
    id, name, job_type, status, "interval", cron_expression, specific_times,
    market_codes, account_ids, parameters, max_retries, timeout_minutes, priority,
    is_active, last_run_at, next_run_at, last_success_at, last_error,
    run_count, success_count, error_count
"#;

/// Raw `schedule_jobs` row before enum and time decoding.
#[derive(Debug, sqlx::FromRow)]
pub struct ScheduleJobRow {
    pub id: i64,
    pub name: String,
    pub job_type: String,
    pub status: String,
    pub interval: Option<String>,
    pub cron_expression: Option<String>,
    pub specific_times: Vec<String>,
    pub market_codes: Vec<String>,
    pub account_ids: Vec<String>,
    pub parameters: serde_json::Value,
    pub max_retries: i32,
    pub timeout_minutes: i32,
    pub priority: i32,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: i32,
    pub success_count: i32,
    pub error_count: i32,
}

impl TryFrom<ScheduleJobRow> for ScheduleJob {
    type Error = StoreError;

    fn try_from(row: ScheduleJobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let decode_err = move |column: &'static str, value: &str| StoreError::Decode {
            id,
            column,
            value: value.to_string(),
        };

        let job_type =
            JobType::from_str(&row.job_type).map_err(|_| decode_err("job_type", &row.job_type))?;
        let status =
            JobStatus::from_str(&row.status).map_err(|_| decode_err("status", &row.status))?;
        let interval = row
            .interval
            .as_deref()
            .map(|code| ScheduleInterval::from_str(code).map_err(|_| decode_err("interval", code)))
            .transpose()?;
        let specific_times = row
            .specific_times
            .iter()
            .map(|t| parse_specific_time(t).ok_or_else(|| decode_err("specific_times", t)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScheduleJob {
            id: row.id,
            name: row.name,
            job_type,
            status,
            interval,
            cron_expression: row.cron_expression,
            specific_times,
            market_codes: row.market_codes,
            account_ids: row.account_ids,
            parameters: row.parameters,
            max_retries: row.max_retries,
            timeout_minutes: row.timeout_minutes,
            priority: row.priority,
            is_active: row.is_active,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            last_success_at: row.last_success_at,
            last_error: row.last_error,
            run_count: row.run_count,
            success_count: row.success_count,
            error_count: row.error_count,
        })
    }
}

/// Decode rows, skipping (and logging) ones an operator left malformed.
fn decode_rows(rows: Vec<ScheduleJobRow>) -> Vec<ScheduleJob> {
    rows.into_iter()
        .filter_map(|row| match ScheduleJob::try_from(row) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::error!(error = %e, "Skipping undecodable schedule job");
                None
            }
        })
        .collect()
}

/// Jobs eligible for polling, highest priority first
pub async fn list_active_jobs(pool: &PgPool) -> Result<Vec<ScheduleJob>, StoreError> {
    let rows = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM schedule_jobs
        WHERE is_active = TRUE AND status = 'active'
        ORDER BY priority DESC, id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(decode_rows(rows))
}

/// All jobs, for operator listing
pub async fn list_jobs(pool: &PgPool) -> Result<Vec<ScheduleJob>, StoreError> {
    let rows = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM schedule_jobs
        ORDER BY priority DESC, id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(decode_rows(rows))
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: i64) -> Result<Option<ScheduleJob>, StoreError> {
    let row = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM schedule_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(ScheduleJob::try_from).transpose()
}

/// Insert a new active job
pub async fn create_job(pool: &PgPool, new_job: &NewScheduleJob) -> Result<ScheduleJob, StoreError> {
    let name = new_job.resolved_name(Utc::now());
    let interval = new_job.interval.map(|i| i.to_string());

    let row = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        r#"
        INSERT INTO schedule_jobs
            (name, job_type, status, "interval", cron_expression, specific_times,
             market_codes, account_ids, parameters, max_retries, timeout_minutes,
             priority, next_run_at)
        VALUES ($1, $2, 'active', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(&name)
    .bind(new_job.job_type.as_ref())
    .bind(interval)
    .bind(&new_job.cron_expression)
    .bind(&new_job.specific_times)
    .bind(&new_job.market_codes)
    .bind(&new_job.account_ids)
    .bind(&new_job.parameters)
    .bind(new_job.max_retries)
    .bind(new_job.timeout_minutes)
    .bind(new_job.priority)
    .bind(new_job.next_run_at)
    .fetch_one(pool)
    .await?;

    ScheduleJob::try_from(row)
}

/// Update job status (operator pause/resume)
pub async fn set_job_status(
    pool: &PgPool,
    job_id: i64,
    status: JobStatus,
) -> Result<ScheduleJob, StoreError> {
    let row = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        r#"
        UPDATE schedule_jobs
        SET status = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(status.as_ref())
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::JobNotFound(job_id))?;

    ScheduleJob::try_from(row)
}

/// Take a job out of scheduling without deleting it
pub async fn deactivate_job(pool: &PgPool, job_id: i64) -> Result<ScheduleJob, StoreError> {
    let row = sqlx::query_as::<_, ScheduleJobRow>(&format!(
        r#"
        UPDATE schedule_jobs
        SET is_active = FALSE, updated_at = NOW()
        WHERE id = $1
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::JobNotFound(job_id))?;

    ScheduleJob::try_from(row)
}

/// Recompute `next_run_at` for all interval-based jobs in one statement
pub async fn refresh_next_run_times(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE schedule_jobs
        SET next_run_at = last_run_at + CASE "interval"
                WHEN '5m'  THEN INTERVAL '5 minutes'
                WHEN '10m' THEN INTERVAL '10 minutes'
                WHEN '15m' THEN INTERVAL '15 minutes'
                WHEN '30m' THEN INTERVAL '30 minutes'
                WHEN '1h'  THEN INTERVAL '1 hour'
                WHEN '2h'  THEN INTERVAL '2 hours'
                WHEN '3h'  THEN INTERVAL '3 hours'
                WHEN '6h'  THEN INTERVAL '6 hours'
                WHEN '12h' THEN INTERVAL '12 hours'
                WHEN '1d'  THEN INTERVAL '1 day'
                WHEN '1w'  THEN INTERVAL '7 days'
                WHEN '1M'  THEN INTERVAL '30 days'
            END
        WHERE is_active = TRUE
          AND status = 'active'
          AND last_run_at IS NOT NULL
          AND "interval" IN ('5m', '10m', '15m', '30m', '1h', '2h', '3h', '6h', '12h', '1d', '1w', '1M')
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Success bookkeeping: bump counters, clear the last error
pub async fn mark_job_success(
    pool: &PgPool,
    job_id: i64,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE schedule_jobs
        SET run_count = run_count + 1,
            success_count = success_count + 1,
            last_run_at = $2,
            last_success_at = $2,
            last_error = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Failure bookkeeping: bump counters, keep a bounded error message
pub async fn mark_job_failure(
    pool: &PgPool,
    job_id: i64,
    at: DateTime<Utc>,
    error: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE schedule_jobs
        SET run_count = run_count + 1,
            error_count = error_count + 1,
            last_run_at = $2,
            last_error = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(at)
    .bind(truncate_error(error))
    .execute(pool)
    .await?;

    Ok(())
}
