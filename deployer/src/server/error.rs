//! Mapping of deployer errors to HTTP responses

use api_models::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::errors::DeployerError;

/// HTTP status for an error
pub fn status_code(err: &DeployerError) -> StatusCode {
    match err {
        DeployerError::ToolMissing { .. } => StatusCode::FAILED_DEPENDENCY,
        DeployerError::AlreadyInProgress(_) => StatusCode::CONFLICT,
        DeployerError::InvalidTransition(_) => StatusCode::CONFLICT,
        DeployerError::NotFound(_) => StatusCode::NOT_FOUND,
        DeployerError::ValidationError(_) => StatusCode::BAD_REQUEST,
        DeployerError::TemplateMissing(_) | DeployerError::TemplateError(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for DeployerError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
