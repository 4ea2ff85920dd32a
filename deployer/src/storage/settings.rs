//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Also write logs under `<base_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// LiveKit CLI and project configuration
    #[serde(default)]
    pub livekit: LiveKitSettings,

    /// Status poller configuration
    #[serde(default)]
    pub poller: PollerSettings,

    /// Cleanup scheduler configuration
    #[serde(default)]
    pub cleanup: CleanupSettings,

    /// Overrides `<base_dir>/templates`
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: false,
            server: ServerSettings::default(),
            livekit: LiveKitSettings::default(),
            poller: PollerSettings::default(),
            cleanup: CleanupSettings::default(),
            templates_dir: None,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3027
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// LiveKit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveKitSettings {
    /// CLI binary name looked up on PATH
    #[serde(default = "default_cli_name")]
    pub cli_name: String,

    /// Well-known install locations checked before PATH
    #[serde(default = "default_cli_paths")]
    pub cli_paths: Vec<PathBuf>,

    /// Remote project the agents are created in
    #[serde(default = "default_project")]
    pub project: String,

    /// Subdomain written into the generated project descriptor
    #[serde(default = "default_subdomain")]
    pub subdomain: String,

    /// Build step, run inside the agent workspace
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,

    /// At least 10 seconds
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Clamped to 30..=60 seconds
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,

    /// Timeout for list/delete/version CLI calls, at least 5 seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_cli_name() -> String {
    "lk".to_string()
}

fn default_cli_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/bin/lk"),
        PathBuf::from("/opt/homebrew/bin/lk"),
    ]
}

fn default_project() -> String {
    "gobi".to_string()
}

fn default_subdomain() -> String {
    "gobi".to_string()
}

fn default_build_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        "py_compile".to_string(),
        "agent.py".to_string(),
    ]
}

const MIN_BUILD_TIMEOUT_SECS: u64 = 10;
const MIN_QUERY_TIMEOUT_SECS: u64 = 5;

fn default_build_timeout() -> u64 {
    120
}

fn default_deploy_timeout() -> u64 {
    60
}

fn default_query_timeout() -> u64 {
    15
}

impl LiveKitSettings {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs.max(MIN_BUILD_TIMEOUT_SECS))
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs.clamp(30, 60))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(MIN_QUERY_TIMEOUT_SECS))
    }
}

impl Default for LiveKitSettings {
    fn default() -> Self {
        Self {
            cli_name: default_cli_name(),
            cli_paths: default_cli_paths(),
            project: default_project(),
            subdomain: default_subdomain(),
            build_command: default_build_command(),
            build_timeout_secs: default_build_timeout(),
            deploy_timeout_secs: default_deploy_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

/// Status poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Interval used while a deployment is in flight
    #[serde(default = "default_fast_poll_interval")]
    pub fast_interval_secs: u64,

    /// A deployment running longer than this is shown as stuck
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_fast_poll_interval() -> u64 {
    1
}

fn default_stuck_after() -> u64 {
    120
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            fast_interval_secs: default_fast_poll_interval(),
            stuck_after_secs: default_stuck_after(),
        }
    }
}

/// Cleanup scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Start the scheduler with the service
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,

    /// Logs of settled deployments older than this are dropped
    #[serde(default = "default_log_retention")]
    pub log_retention_secs: u64,

    /// A local agent without a heartbeat for this long is offline
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_log_retention() -> u64 {
    24 * 3600
}

fn default_heartbeat_timeout() -> u64 {
    30
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_cleanup_interval(),
            log_retention_secs: default_log_retention(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}
