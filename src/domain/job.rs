use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Rotation,
    Gating,
    Scoring,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Rotation => "rotation",
            JobType::Gating => "gating",
            JobType::Scoring => "scoring",
        }
    }
}

impl FromStr for JobType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotation" => Ok(JobType::Rotation),
            "gating" => Ok(JobType::Gating),
            "scoring" => Ok(JobType::Scoring),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobMode {
    DailyFull,
    HourlyOverlay,
    OnDemand,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::DailyFull => "daily_full",
            JobMode::HourlyOverlay => "hourly_overlay",
            JobMode::OnDemand => "on_demand",
        }
    }
}

impl FromStr for JobMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_full" => Ok(JobMode::DailyFull),
            "hourly_overlay" => Ok(JobMode::HourlyOverlay),
            "on_demand" => Ok(JobMode::OnDemand),
            other => Err(format!("unknown job mode: {other}")),
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Staging,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Staging => "staging",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "staging" => Ok(JobStatus::Staging),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: String,
    pub market_scope: String,
    pub job_type: String,
    pub mode: String,
    pub created_by: String,
    pub status: String,
    pub assets_processed: i64,
    pub assets_success: i64,
    pub assets_failed: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobRun {
    pub fn status(&self) -> JobStatus {
        self.status.parse().unwrap_or(JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Processing => "PROCESSING",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QueueStatus::Pending),
            "PROCESSING" => Ok(QueueStatus::Processing),
            "COMPLETED" => Ok(QueueStatus::Completed),
            "FAILED" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub job_type: String,
    pub market_scope: Option<String>,
    pub payload: serde_json::Value,
    pub status: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}
