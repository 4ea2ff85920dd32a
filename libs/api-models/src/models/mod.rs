//! Deployer API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    pub retryable: bool,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

// ================================ DEPLOYMENT LOGS ================================ //

/// One deployment log line as seen by the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub index: u64,
    pub timestamp: String,
    pub message: String,
    pub level: String,
    pub source: String,
}

/// `GET /api/deployment-logs/{agent_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    /// Pre-formatted `[HH:MM:SS] message` lines
    pub logs: Vec<String>,
    pub entries: Vec<LogLine>,
}

/// `POST /api/deployment-logs/{agent_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogRequest {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Response to an appended log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogResponse {
    pub success: bool,
    pub entry: LogLine,
}

// ================================== DEPLOYMENTS ================================== //

/// Returned when a deploy or retry has been accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAccepted {
    pub agent_id: String,
    pub status: String,
    pub message: String,
}

// ================================== LOCAL AGENTS ================================= //

/// Heartbeat sent by an agent process running outside the cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub process_id: Option<String>,
    #[serde(default)]
    pub port: Option<serde_json::Value>,
    #[serde(default)]
    pub host: Option<String>,
}

/// Unregister request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveLocalAgentRequest {
    pub agent_id: String,
}

// ==================================== CLEANUP ==================================== //

/// Cleanup scheduler status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStatusResponse {
    pub running: bool,
    pub runs: u64,
    pub last_run_at: Option<String>,
    pub last_purged_logs: usize,
    pub last_purged_agents: usize,
}

/// LiveKit CLI version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliVersionResponse {
    pub path: String,
    pub version: String,
}
