//! Error types for the GOBI deployer

use std::time::Duration;

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("{tool} is required but was not found; install it or set its path in settings")]
    ToolMissing { tool: String },

    #[error("{program} exited with code {code:?}: {stderr}")]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("Build failed: {0}")]
    BuildFailure(String),

    #[error("Deploy failed: {0}")]
    DeployFailure(String),

    #[error("Template not found: {0}")]
    TemplateMissing(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("A deployment is already in progress for agent {0}")]
    AlreadyInProgress(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Deployment cancelled for agent {0}")]
    Cancelled(String),

    #[error("Room service error: {0}")]
    RoomServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeployerError::BuildFailure(_)
                | DeployerError::DeployFailure(_)
                | DeployerError::ProcessFailed { .. }
                | DeployerError::Timeout { .. }
                | DeployerError::HttpError(_)
                | DeployerError::RoomServiceError(_)
        )
    }

    /// Short machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            DeployerError::IoError(_) => "io",
            DeployerError::JsonError(_) => "json",
            DeployerError::TomlError(_) => "toml",
            DeployerError::HttpError(_) => "http",
            DeployerError::TokenError(_) => "token",
            DeployerError::ToolMissing { .. } => "tool_missing",
            DeployerError::ProcessFailed { .. } => "process_failed",
            DeployerError::Timeout { .. } => "timeout",
            DeployerError::BuildFailure(_) => "build_failure",
            DeployerError::DeployFailure(_) => "deploy_failure",
            DeployerError::TemplateMissing(_) => "template_missing",
            DeployerError::TemplateError(_) => "template",
            DeployerError::AlreadyInProgress(_) => "already_in_progress",
            DeployerError::InvalidTransition(_) => "invalid_transition",
            DeployerError::Cancelled(_) => "cancelled",
            DeployerError::RoomServiceError(_) => "room_service",
            DeployerError::ValidationError(_) => "validation",
            DeployerError::NotFound(_) => "not_found",
            DeployerError::ConfigError(_) => "config",
            DeployerError::ServerError(_) => "server",
            DeployerError::ShutdownError(_) => "shutdown",
            DeployerError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}
