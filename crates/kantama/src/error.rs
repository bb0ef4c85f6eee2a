use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::leasing::{AuthError, RegistryError, RepositoryError, WorkflowError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure surfaced by the service binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Workflow(value.into())
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        Self::Workflow(value.into())
    }
}

impl From<AuthError> for AppError {
    fn from(value: AuthError) -> Self {
        Self::Workflow(value.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // Keeps the workflow's own status and error code.
            AppError::Workflow(err) => err.into_response(),
            other => {
                let body = Json(json!({ "code": "internal", "error": other.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
