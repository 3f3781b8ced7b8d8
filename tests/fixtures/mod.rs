//! Job and settings fixtures shared by the integration tests

#![allow(dead_code)]

use market_scheduler::handlers::BackupSettings;
use market_scheduler::models::job::{JobStatus, JobType, ScheduleInterval, ScheduleJob};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::Path;

/// An active, never-run job of the given type with no schedule constraints.
pub fn job(job_type: JobType) -> ScheduleJob {
    ScheduleJob {
        id: 0,
        name: format!("{job_type}_fixture"),
        job_type,
        status: JobStatus::Active,
        interval: None,
        cron_expression: None,
        specific_times: vec![],
        market_codes: vec![],
        account_ids: vec![],
        parameters: json!({}),
        max_retries: 3,
        timeout_minutes: 60,
        priority: 0,
        is_active: true,
        last_run_at: None,
        next_run_at: None,
        last_success_at: None,
        last_error: None,
        run_count: 0,
        success_count: 0,
        error_count: 0,
    }
}

/// Hourly product collection across the given markets.
pub fn product_job(markets: &[&str]) -> ScheduleJob {
    ScheduleJob {
        interval: Some(ScheduleInterval::Hourly),
        market_codes: markets.iter().map(|m| m.to_string()).collect(),
        account_ids: vec!["seller-1".to_string()],
        ..job(JobType::ProductCollection)
    }
}

/// Daily backup keeping `retention_days` worth of dumps.
pub fn backup_job(retention_days: i64) -> ScheduleJob {
    ScheduleJob {
        interval: Some(ScheduleInterval::Daily),
        parameters: json!({ "retention_days": retention_days }),
        ..job(JobType::DatabaseBackup)
    }
}

pub fn backup_settings(backup_dir: &Path, dump_command: &Path) -> BackupSettings {
    BackupSettings {
        backup_dir: backup_dir.to_path_buf(),
        dump_command: dump_command.to_path_buf(),
        db_host: "localhost".to_string(),
        db_port: 5432,
        db_name: "shop".to_string(),
        db_user: "postgres".to_string(),
        db_password: "secret".to_string(),
    }
}

/// `job` on a fixed interval, last run at `at`.
pub fn ran_at(job: ScheduleJob, interval: ScheduleInterval, at: DateTime<Utc>) -> ScheduleJob {
    ScheduleJob {
        interval: Some(interval),
        last_run_at: Some(at),
        run_count: 1,
        success_count: 1,
        ..job
    }
}
