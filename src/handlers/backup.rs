use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::process::Command;

use super::{HandlerError, JobHandler};
use crate::config::AppConfig;
use crate::models::execution::JobExecution;
use crate::models::job::ScheduleJob;

const BACKUP_PREFIX: &str = "backup_";
const DEFAULT_RETENTION_DAYS: i64 = 30;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Where dumps go and how to reach the database being dumped.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_dir: PathBuf,
    pub dump_command: PathBuf,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
}

impl BackupSettings {
    /// Dump target matching the pool's connection: `DATABASE_URL` when set,
    /// otherwise the `DB_*` settings.
    pub fn from_config(config: &AppConfig) -> Result<Self, sqlx::Error> {
        let options = config.connect_options()?;
        let db_password = config
            .database_url
            .as_deref()
            .and_then(url_password)
            .unwrap_or_else(|| config.db_password.clone());

        Ok(Self {
            backup_dir: config.backup_dir.clone(),
            dump_command: config.pg_dump_path.clone(),
            db_host: options.get_host().to_string(),
            db_port: options.get_port(),
            db_name: options
                .get_database()
                .unwrap_or(&config.db_name)
                .to_string(),
            db_user: options.get_username().to_string(),
            db_password,
        })
    }
}

fn url_password(database_url: &str) -> Option<String> {
    let url = Url::parse(database_url).ok()?;
    let raw = url.password()?;
    Some(
        urlencoding::decode(raw)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| raw.to_string()),
    )
}

/// Retention window for `retention_days`, rejecting values too large to
/// represent. Negative values count as zero.
fn retention_window(retention_days: i64) -> Result<Duration, HandlerError> {
    u64::try_from(retention_days.max(0))
        .ok()
        .and_then(|days| days.checked_mul(SECS_PER_DAY))
        .map(Duration::from_secs)
        .ok_or_else(|| {
            HandlerError::Backup(format!("retention_days {retention_days} is out of range"))
        })
}

/// Dumps the database to a timestamped file, then prunes old dumps.
///
/// Parameters: `retention_days` (default 30).
pub struct BackupHandler {
    settings: BackupSettings,
}

impl BackupHandler {
    pub fn new(settings: BackupSettings) -> Self {
        Self { settings }
    }

    fn backup_path(&self, execution: &JobExecution) -> PathBuf {
        let file_name = format!(
            "{BACKUP_PREFIX}{}_{}_{}.dump",
            self.settings.db_name,
            Utc::now().format("%Y%m%d_%H%M%S"),
            execution.id
        );
        self.settings.backup_dir.join(file_name)
    }

    async fn dump(&self, path: &Path) -> Result<(), HandlerError> {
        let s = &self.settings;
        let output = Command::new(&s.dump_command)
            .arg("-h")
            .arg(&s.db_host)
            .arg("-p")
            .arg(s.db_port.to_string())
            .arg("-U")
            .arg(&s.db_user)
            .arg("-d")
            .arg(&s.db_name)
            .arg("-F")
            .arg("c")
            .arg("-f")
            .arg(path)
            // Only the child sees the password
            .env("PGPASSWORD", &s.db_password)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                HandlerError::Backup(format!("failed to run {}: {e}", s.dump_command.display()))
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(path).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HandlerError::Backup(format!(
                "{} exited with {}: {}",
                s.dump_command.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl JobHandler for BackupHandler {
    async fn run(&self, job: &ScheduleJob, execution: &JobExecution) -> Result<Value, HandlerError> {
        let retention_days = job.param_i64("retention_days", DEFAULT_RETENTION_DAYS).max(0);
        let retention = retention_window(retention_days)?;

        tokio::fs::create_dir_all(&self.settings.backup_dir).await?;

        let path = self.backup_path(execution);
        tracing::info!(job_id = job.id, path = %path.display(), "Starting database dump");
        self.dump(&path).await?;

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        tracing::info!(job_id = job.id, path = %path.display(), size_bytes, "Database dump written");

        let deleted = match prune_old_backups(&self.settings.backup_dir, retention, SystemTime::now()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Failed to prune old backups");
                Vec::new()
            }
        };

        Ok(json!({
            "backup_file": path.display().to_string(),
            "size_bytes": size_bytes,
            "retention_days": retention_days,
            "deleted_files": deleted.len(),
            "records_processed": 1,
        }))
    }
}

/// Delete `backup_*` files in `dir` last modified more than `retention` before `now`.
pub async fn prune_old_backups(
    dir: &Path,
    retention: Duration,
    now: SystemTime,
) -> std::io::Result<Vec<PathBuf>> {
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut deleted = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with(BACKUP_PREFIX) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() || metadata.modified()? >= cutoff {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Deleted expired backup");
                deleted.push(path);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to delete expired backup"),
        }
    }

    Ok(deleted)
}
