use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::execution::{ExecutionStatus, JobExecution};
use crate::store::StoreError;

/// Open a running execution record and return its id
pub async fn insert_execution(
    pool: &PgPool,
    job_id: i64,
    started_at: DateTime<Utc>,
    parameters: &serde_json::Value,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO job_executions (job_id, status, started_at, parameters)
        VALUES ($1, 'running', $2, $3)
        RETURNING id
        "#,
    )
    .bind(job_id)
    .bind(started_at)
    .bind(parameters)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

/// Close an execution record with its outcome
pub async fn finalize_execution(pool: &PgPool, execution: &JobExecution) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE job_executions
        SET status = $1,
            completed_at = $2,
            duration_seconds = $3,
            records_processed = $4,
            error_message = $5,
            result_summary = $6
        WHERE id = $7
        "#,
    )
    .bind(execution.status.as_ref())
    .bind(execution.completed_at)
    .bind(execution.duration_seconds)
    .bind(execution.records_processed)
    .bind(&execution.error_message)
    .bind(&execution.result_summary)
    .bind(execution.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent executions of a job
pub async fn list_executions(
    pool: &PgPool,
    job_id: i64,
    limit: i64,
) -> Result<Vec<JobExecution>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, job_id, status, started_at, completed_at, duration_seconds,
               records_processed, error_message, parameters, result_summary
        FROM job_executions
        WHERE job_id = $1
        ORDER BY started_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(job_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<JobExecution, StoreError> {
            let id: i64 = r.try_get("id")?;
            let status_str: String = r.try_get("status")?;
            let status = ExecutionStatus::from_str(&status_str).map_err(|_| StoreError::Decode {
                id,
                column: "status",
                value: status_str.clone(),
            })?;

            Ok(JobExecution {
                id,
                job_id: r.try_get("job_id")?,
                status,
                started_at: r.try_get("started_at")?,
                completed_at: r.try_get("completed_at")?,
                duration_seconds: r.try_get("duration_seconds")?,
                records_processed: r.try_get("records_processed")?,
                error_message: r.try_get("error_message")?,
                parameters: r.try_get("parameters")?,
                result_summary: r.try_get("result_summary")?,
            })
        })
        .collect()
}
