//! Credential management for saved destinations.
//!
//! Plaintext passwords exist only inside these handlers, between request
//! parsing and vault encryption. Responses carry presence and the auto-login
//! flag, never blob or plaintext.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use zeroize::Zeroize;

use crate::http::auth::OwnerId;
use crate::http::error::ApiError;
use crate::state::AppState;
use crate::storage::CredentialStatus;

#[derive(Debug, Deserialize)]
pub struct SetCredentialsRequest {
    #[serde(default)]
    pub username: String,
    /// Empty means "keep the stored password"; the blob and its key version
    /// are preserved bitwise.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub auto_login: bool,
}

/// `PUT /api/v1/destinations/{id}/credentials`
pub async fn set(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut req): Json<SetCredentialsRequest>,
) -> Result<Json<CredentialStatus>, ApiError> {
    // Ownership check happens in the destination lookup itself.
    let dest = state.db.get_destination(&id, &owner).await?;

    let result = if req.password.is_empty() {
        state
            .db
            .upsert_credentials(&dest.id, &req.username, None, req.auto_login)
            .await
            .map_err(|err| match err {
                mudgate_core::db::DatabaseError::NotFound(_) => ApiError::Validation(
                    "Password is required when no credentials are stored".into(),
                ),
                other => other.into(),
            })
    } else {
        let (blob, version) = state.vault.encrypt(req.password.as_bytes())?;
        state
            .db
            .upsert_credentials(&dest.id, &req.username, Some((&blob, version)), req.auto_login)
            .await
            .map_err(ApiError::from)
    };
    req.password.zeroize();
    result?;

    let status = state.db.get_credential_status(&dest.id).await?;
    Ok(Json(status))
}

/// `GET /api/v1/destinations/{id}/credentials`
pub async fn status(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CredentialStatus>, ApiError> {
    let dest = state.db.get_destination(&id, &owner).await?;
    let status = state.db.get_credential_status(&dest.id).await?;
    Ok(Json(status))
}

/// `DELETE /api/v1/destinations/{id}/credentials`
pub async fn delete(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let dest = state.db.get_destination(&id, &owner).await?;

    if state.db.delete_credentials(&dest.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Credentials for destination {id} not found"
        )))
    }
}
