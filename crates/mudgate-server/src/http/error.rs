//! Control-plane error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use mudgate_core::db::DatabaseError;
use mudgate_vault::VaultError;

use crate::session::SessionError;

/// Errors surfaced to HTTP clients as `{"error": "..."}` bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("User already has an active session")]
    AlreadyConnected,

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyConnected => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => {
                tracing::error!(error = %other, "Database error");
                Self::Internal
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Policy(policy) => Self::Validation(policy.to_string()),
            SessionError::AlreadyConnected => Self::AlreadyConnected,
            SessionError::DialTimeout(_) | SessionError::DialFailed(_) => {
                Self::Unavailable(err.to_string())
            }
            SessionError::NotConnected => Self::Validation("No active session".into()),
            other => {
                tracing::error!(error = %other, "Session error");
                Self::Internal
            }
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        // The specific kind (including which key version failed) stays in
        // the server log; the client sees only an internal error.
        tracing::error!(error = %err, "Vault error");
        Self::Internal
    }
}
