use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Operator API bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Scheduler daemon health/metrics bind address.
    #[serde(default = "default_scheduler_bind_addr")]
    pub scheduler_bind_addr: String,

    /// PostgreSQL connection string. Takes precedence over the `DB_*` settings.
    pub database_url: Option<String>,

    #[serde(default = "default_db_host")]
    pub db_host: String,

    #[serde(default = "default_db_port")]
    pub db_port: u16,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_db_user")]
    pub db_user: String,

    #[serde(default)]
    pub db_password: String,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Back-off after a failed poll cycle
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// How long `stop()` waits for each in-flight worker
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// UTC offset that `specific_times` are expressed in
    #[serde(default = "default_schedule_utc_offset_hours")]
    pub schedule_utc_offset_hours: i32,

    /// Directory database dumps are written to
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Dump utility invoked by the backup job
    #[serde(default = "default_pg_dump_path")]
    pub pg_dump_path: PathBuf,

    /// Base URL of the marketplace collector service
    #[serde(default = "default_collector_base_url")]
    pub collector_base_url: String,

    /// Bearer token for the collector service
    pub collector_api_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_scheduler_bind_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_error_backoff_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_schedule_utc_offset_hours() -> i32 {
    9
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_pg_dump_path() -> PathBuf {
    PathBuf::from("pg_dump")
}

fn default_collector_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Connection options for the pool, from `DATABASE_URL` or the `DB_*` set.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.database_url {
            Some(url) => url.parse(),
            None => Ok(PgConnectOptions::new()
                .host(&self.db_host)
                .port(self.db_port)
                .database(&self.db_name)
                .username(&self.db_user)
                .password(&self.db_password)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Falls back to UTC when the configured offset is out of range.
    pub fn schedule_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.schedule_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}
