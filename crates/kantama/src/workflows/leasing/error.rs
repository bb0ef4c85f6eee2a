use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::auth::AuthError;
use super::domain::ValidationError;
use super::files::{BlobError, UploadRejection};
use super::identity::IdentityError;
use super::lifecycle::TransitionError;
use super::registry::RegistryError;
use super::repository::{RepositoryError, SinkError};

/// Caller-facing failure of a workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Unauthenticated => "unauthenticated",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Forbidden(_) => "forbidden",
            WorkflowError::InvalidState(_) => "invalid_state",
            WorkflowError::Validation(_) => "validation_failed",
            WorkflowError::UpstreamUnavailable(_) => "upstream_unavailable",
            WorkflowError::Duplicate(_) => "duplicate",
            WorkflowError::Storage(_) => "storage_failure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::Unauthenticated => StatusCode::UNAUTHORIZED,
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::InvalidState(_) | WorkflowError::Duplicate(_) => StatusCode::CONFLICT,
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let payload = json!({
            "code": self.code(),
            "error": self.to_string(),
        });
        (self.status_code(), axum::Json(payload)).into_response()
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::RoleNotPermitted { .. } => Self::Forbidden(error.to_string()),
            TransitionError::InvalidState { .. } => Self::InvalidState(error.to_string()),
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) => Self::Duplicate(message),
            RepositoryError::NotFound => Self::not_found("record"),
            RepositoryError::Unavailable(message) => Self::Storage(message),
        }
    }
}

impl From<SinkError> for WorkflowError {
    fn from(error: SinkError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<ValidationError> for WorkflowError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error.0)
    }
}

impl From<UploadRejection> for WorkflowError {
    fn from(error: UploadRejection) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<BlobError> for WorkflowError {
    fn from(error: BlobError) -> Self {
        match error {
            BlobError::Missing(_) => Self::not_found("file content"),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<RegistryError> for WorkflowError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::InvalidBusinessId(_) | RegistryError::InvalidQuery(_) => {
                Self::Validation(error.to_string())
            }
            RegistryError::NotFound => Self::not_found("company"),
            RegistryError::Timeout(_) | RegistryError::Transport(_) | RegistryError::Decode(_) => {
                Self::UpstreamUnavailable(error.to_string())
            }
        }
    }
}

impl From<AuthError> for WorkflowError {
    fn from(_: AuthError) -> Self {
        Self::Unauthenticated
    }
}

impl From<IdentityError> for WorkflowError {
    fn from(_: IdentityError) -> Self {
        Self::Unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let cases = [
            (WorkflowError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (WorkflowError::not_found("offer"), StatusCode::NOT_FOUND),
            (WorkflowError::forbidden("no"), StatusCode::FORBIDDEN),
            (WorkflowError::invalid_state("no"), StatusCode::CONFLICT),
            (WorkflowError::Duplicate("twice".into()), StatusCode::CONFLICT),
            (WorkflowError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                WorkflowError::UpstreamUnavailable("slow".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (WorkflowError::Storage("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error.code());
        }
    }

    #[test]
    fn registry_timeout_is_upstream_not_missing() {
        let error: WorkflowError = RegistryError::Timeout("10s".into()).into();
        assert!(matches!(error, WorkflowError::UpstreamUnavailable(_)));
        let error: WorkflowError = RegistryError::NotFound.into();
        assert!(matches!(error, WorkflowError::NotFound { entity: "company" }));
    }

    #[test]
    fn repository_conflict_is_duplicate() {
        let error: WorkflowError = RepositoryError::Conflict("assigned".into()).into();
        assert_eq!(error.code(), "duplicate");
    }
}
