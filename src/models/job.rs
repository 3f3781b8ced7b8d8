use chrono::{DateTime, Duration, NaiveTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Maximum stored length (in characters) of `schedule_jobs.last_error`.
pub const MAX_ERROR_LEN: usize = 500;

/// Kind of work a scheduled job performs. Each kind maps to one handler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    ProductCollection,
    OrderCollection,
    InventorySync,
    PriceUpdate,
    ShipmentSync,
    ReturnSync,
    DatabaseBackup,
    ReportGeneration,
}

/// Lifecycle state of a job definition. Only `Active` jobs are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Active,
    Paused,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Fixed repeat intervals a job can be scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
pub enum ScheduleInterval {
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    #[strum(serialize = "10m")]
    TenMinutes,
    #[serde(rename = "15m")]
    #[strum(serialize = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    #[strum(serialize = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    Hourly,
    #[serde(rename = "2h")]
    #[strum(serialize = "2h")]
    TwoHours,
    #[serde(rename = "3h")]
    #[strum(serialize = "3h")]
    ThreeHours,
    #[serde(rename = "6h")]
    #[strum(serialize = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    #[strum(serialize = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    #[strum(serialize = "1d")]
    Daily,
    #[serde(rename = "1w")]
    #[strum(serialize = "1w")]
    Weekly,
    #[serde(rename = "1M")]
    #[strum(serialize = "1M")]
    Monthly,
}

impl ScheduleInterval {
    pub fn duration(self) -> Duration {
        match self {
            Self::FiveMinutes => Duration::minutes(5),
            Self::TenMinutes => Duration::minutes(10),
            Self::FifteenMinutes => Duration::minutes(15),
            Self::ThirtyMinutes => Duration::minutes(30),
            Self::Hourly => Duration::hours(1),
            Self::TwoHours => Duration::hours(2),
            Self::ThreeHours => Duration::hours(3),
            Self::SixHours => Duration::hours(6),
            Self::TwelveHours => Duration::hours(12),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
            Self::Monthly => Duration::days(30),
        }
    }
}

/// Marketplaces a collection job can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum MarketCode {
    #[serde(rename = "coupang")]
    #[strum(serialize = "coupang")]
    Coupang,
    #[serde(rename = "naver")]
    #[strum(serialize = "naver")]
    Naver,
    #[serde(rename = "11st")]
    #[strum(serialize = "11st")]
    Elevenst,
}

/// A recurring task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id: i64,
    pub name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub interval: Option<ScheduleInterval>,
    pub cron_expression: Option<String>,
    /// Wall-clock times at which the job runs every day.
    pub specific_times: Vec<NaiveTime>,
    pub market_codes: Vec<String>,
    pub account_ids: Vec<String>,
    /// Opaque handler configuration.
    pub parameters: serde_json::Value,
    /// Declared retry budget. Not consulted by the scheduler.
    pub max_retries: i32,
    /// Lock TTL for one execution.
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

impl ScheduleJob {
    /// Read an integer handler parameter, falling back to `default`.
    pub fn param_i64(&self, key: &str, default: i64) -> i64 {
        self.parameters
            .get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(default)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.timeout_minutes))
    }
}

/// Request body for creating a job through the operator API.
#[derive(Debug, Deserialize, Validate)]
pub struct NewScheduleJob {
    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[garde(skip)]
    pub job_type: JobType,

    #[garde(skip)]
    pub interval: Option<ScheduleInterval>,

    #[garde(length(min = 1, max = 100))]
    pub cron_expression: Option<String>,

    /// `HH:MM` wall-clock times.
    #[garde(inner(length(min = 4, max = 8)))]
    #[serde(default)]
    pub specific_times: Vec<String>,

    #[garde(inner(length(min = 1, max = 20)))]
    #[serde(default)]
    pub market_codes: Vec<String>,

    #[garde(skip)]
    #[serde(default)]
    pub account_ids: Vec<String>,

    #[garde(skip)]
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,

    #[garde(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    #[garde(range(min = 1, max = 1440))]
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i32,

    #[garde(skip)]
    #[serde(default)]
    pub priority: i32,

    #[garde(skip)]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl NewScheduleJob {
    /// Name to store, defaulting to `<job_type>_<timestamp>`.
    pub fn resolved_name(&self, now: DateTime<Utc>) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}", self.job_type, now.format("%Y%m%d_%H%M%S")),
        }
    }
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_max_retries() -> i32 {
    3
}

fn default_timeout_minutes() -> i32 {
    60
}

/// Parse an `HH:MM` (or `HH:MM:SS`) wall-clock time.
pub fn parse_specific_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Cut an error message down to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}
