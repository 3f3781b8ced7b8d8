use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::db::{execution_queries, job_queries};
use crate::models::api::{ExecutionHistoryResponse, HistoryQuery, JobListResponse, JobResponse};
use crate::models::job::{parse_specific_time, JobStatus, NewScheduleJob};
use crate::store::StoreError;

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<JobListResponse>> {
    let jobs = job_queries::list_jobs(&state.db).await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(new_job): Json<NewScheduleJob>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    new_job
        .validate()
        .map_err(|report| ApiError::Validation(report.to_string()))?;

    if let Some(bad) = new_job
        .specific_times
        .iter()
        .find(|t| parse_specific_time(t).is_none())
    {
        return Err(ApiError::BadRequest(format!(
            "specific_times entry {bad:?} is not HH:MM"
        )));
    }

    let job = job_queries::create_job(&state.db, &new_job).await?;
    tracing::info!(job_id = job.id, job_name = %job.name, job_type = %job.job_type, "Job created");

    Ok((
        StatusCode::CREATED,
        Json(JobResponse {
            job,
            message: "Job created".to_string(),
        }),
    ))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = job_queries::get_job(&state.db, job_id)
        .await?
        .ok_or(StoreError::JobNotFound(job_id))?;

    Ok(Json(JobResponse {
        job,
        message: "OK".to_string(),
    }))
}

/// POST /api/v1/jobs/{id}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = job_queries::set_job_status(&state.db, job_id, JobStatus::Paused).await?;
    tracing::info!(job_id, "Job paused");
    Ok(Json(JobResponse {
        job,
        message: "Job paused".to_string(),
    }))
}

/// POST /api/v1/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = job_queries::set_job_status(&state.db, job_id, JobStatus::Active).await?;
    tracing::info!(job_id, "Job resumed");
    Ok(Json(JobResponse {
        job,
        message: "Job resumed".to_string(),
    }))
}

/// POST /api/v1/jobs/{id}/deactivate
pub async fn deactivate_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = job_queries::deactivate_job(&state.db, job_id).await?;
    tracing::info!(job_id, "Job deactivated");
    Ok(Json(JobResponse {
        job,
        message: "Job deactivated".to_string(),
    }))
}

/// GET /api/v1/jobs/{id}/executions?limit=N, newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ExecutionHistoryResponse>> {
    if job_queries::get_job(&state.db, job_id).await?.is_none() {
        return Err(StoreError::JobNotFound(job_id).into());
    }

    let executions =
        execution_queries::list_executions(&state.db, job_id, query.effective_limit()).await?;

    Ok(Json(ExecutionHistoryResponse { job_id, executions }))
}
