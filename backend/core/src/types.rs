use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persistent definition of when and how often an action runs automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Reference to an externally registered action.
    pub action_id: String,
    pub spec: ScheduleSpec,
    /// IANA timezone the spec is evaluated in (e.g. "America/New_York").
    pub timezone: String,
    pub enabled: bool,
    /// Discard a due occurrence (recorded as skipped, not queued) when the
    /// concurrency limit is already saturated.
    pub skip_if_running: bool,
    pub max_concurrent: u32,
    pub timeout_seconds: u64,
    pub retry_enabled: bool,
    pub retry_max_attempts: u32,
    pub retry_delay_seconds: u64,
    pub notify_on_failure: bool,
    /// Written only by the engine, transactionally with run creation.
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, action_id: impl Into<String>, spec: ScheduleSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            action_id: action_id.into(),
            spec,
            timezone: "UTC".to_string(),
            enabled: true,
            skip_if_running: false,
            max_concurrent: 1,
            timeout_seconds: 300,
            retry_enabled: false,
            retry_max_attempts: 0,
            retry_delay_seconds: 0,
            notify_on_failure: false,
            last_fired_at: None,
            created_at: Utc::now(),
        }
    }
}

/// When a schedule fires. The enum makes "exactly one config per type"
/// structurally true; per-variant rules are enforced at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Standard 5-field cron expression (e.g. "*/30 * * * *").
    Cron { expression: String },
    /// Fixed cadence in seconds, anchored to the previous fire.
    Interval { seconds: u64 },
    /// Given weekdays (0 = Sunday .. 6 = Saturday) at a wall-clock "HH:MM".
    Weekday { days: Vec<u8>, time: String },
    /// Fires exactly once, then the schedule is auto-disabled.
    Once { at: DateTime<Utc> },
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Cron { expression } => write!(f, "cron({})", expression),
            ScheduleSpec::Interval { seconds } => write!(f, "every {}s", seconds),
            ScheduleSpec::Weekday { days, time } => write!(f, "weekdays {:?} at {}", days, time),
            ScheduleSpec::Once { at } => write!(f, "once at {}", at.to_rfc3339()),
        }
    }
}

/// One execution attempt of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    /// Globally unique, strictly increasing, gap-tolerant sequence number.
    pub numbered_id: i64,
    pub action_id: String,
    pub schedule_id: Option<Uuid>,
    pub status: RunStatus,
    /// Earliest instant this run may be dispatched (meaningful while pending).
    pub not_before: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    /// Wall-clock duration, set on completion.
    pub run_time_ms: Option<i64>,
    pub attempt_number: u32,
    /// Snapshot of the schedule's timeout at creation.
    pub timeout_seconds: u64,
    pub inputs: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub artifacts_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Run lifecycle state.
///
/// Terminal rows are immutable; a retry is a new row, not a reopened one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Skipped,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
            RunStatus::Skipped => "skipped",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "timeout" => Ok(RunStatus::Timeout),
            "skipped" => Ok(RunStatus::Skipped),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}
