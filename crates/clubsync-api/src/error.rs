use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clubsync_core::reconcile::ReconcileError;
use clubsync_core::sync::SyncPhase;
use clubsync_core::SyncFailure;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Sync(SyncFailure),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<SyncPhase>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sync(failure) => match failure.phase {
                SyncPhase::Precondition => StatusCode::CONFLICT,
                SyncPhase::VcsPull | SyncPhase::VcsPush => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::SnapshotMissing(_) => Self::NotFound(error.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SyncFailure> for AppError {
    fn from(failure: SyncFailure) -> Self {
        Self::Sync(failure)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let phase = match &self {
            Self::Sync(failure) => Some(failure.phase),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            phase,
        };
        (status, Json(body)).into_response()
    }
}
