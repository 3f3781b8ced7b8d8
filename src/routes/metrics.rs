use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics in Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the scheduler's metrics.
pub fn describe_scheduler_metrics() {
    metrics::describe_counter!(
        "scheduler_executions_total",
        "Job executions by job type and final status"
    );
    metrics::describe_histogram!(
        "scheduler_execution_seconds",
        "Wall-clock duration of job executions"
    );
    metrics::describe_counter!(
        "scheduler_lock_contention_total",
        "Dispatches skipped because another worker held the job lock"
    );
    metrics::describe_counter!(
        "scheduler_tick_errors_total",
        "Poll cycles that failed and entered the error back-off"
    );
    metrics::describe_gauge!(
        "scheduler_active_workers",
        "Worker tasks spawned and not yet finished"
    );
}
