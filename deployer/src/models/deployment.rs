//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment status of one agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Inactive,
    Deploying,
    Active,
    Error,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Inactive => "inactive",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Active => "active",
            DeploymentStatus::Error => "error",
        }
    }
}

/// How the cloud agent id was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdConfidence {
    /// Matched in the CLI output
    Parsed,
    /// CLI output had no id; the local agent id stands in
    Fallback,
}

/// Deployment state of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub agent_id: String,

    #[serde(default)]
    pub status: DeploymentStatus,

    /// Handle returned by the LiveKit CLI, e.g. `CA_x7Yt2`
    #[serde(default)]
    pub cloud_agent_id: Option<String>,

    #[serde(default)]
    pub id_confidence: Option<IdConfidence>,

    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deploy_started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub retry_count: u32,

    /// SHA256 of the last generated script
    #[serde(default)]
    pub script_digest: Option<String>,

    /// Last time anything about this record changed
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: DeploymentStatus::Inactive,
            cloud_agent_id: None,
            id_confidence: None,
            last_deployed_at: None,
            deploy_started_at: None,
            last_error: None,
            retry_count: 0,
            script_digest: None,
            updated_at: None,
        }
    }

    /// A deployment that has been in flight for longer than `threshold`
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: std::time::Duration) -> bool {
        if self.status != DeploymentStatus::Deploying {
            return false;
        }
        match self.deploy_started_at {
            Some(started) => (now - started)
                .to_std()
                .map(|elapsed| elapsed > threshold)
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Severity of a deployment log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntryLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl LogEntryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryLevel::Info => "info",
            LogEntryLevel::Warn => "warn",
            LogEntryLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogEntryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "debug" | "success" => Ok(LogEntryLevel::Info),
            "warn" | "warning" => Ok(LogEntryLevel::Warn),
            "error" => Ok(LogEntryLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// One line of a deployment log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based append position
    pub index: u64,

    /// `HH:MM:SS`
    pub timestamp: String,

    pub message: String,

    pub level: LogEntryLevel,

    pub source: String,
}

impl LogEntry {
    /// `[HH:MM:SS] message`, the shape the UI renders
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.timestamp, self.message)
    }
}

/// Which check produced a live status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Cloud,
    Room,
    None,
}

/// Live state of an agent according to LiveKit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub is_deployed: bool,
    pub source: StatusSource,
    pub cloud_agent_id: Option<String>,
    pub room_name: String,
    pub participants: u32,
}

/// State shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    Inactive,
    Deploying,
    Stuck,
    Active,
    Error,
    /// Local and live state disagree
    Inconsistent,
}

/// Reconciled status view consumed by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub agent_id: String,
    pub display_state: DisplayState,
    pub local_status: DeploymentStatus,
    pub live: Option<LiveStatus>,
    pub cloud_agent_id: Option<String>,
    pub logs: Vec<LogEntry>,
    pub can_retry: bool,
    pub can_cancel: bool,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}
