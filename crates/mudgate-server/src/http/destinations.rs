//! Saved-destination CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use mudgate_core::db::{format_rfc3339, DatabaseError};

use crate::http::auth::OwnerId;
use crate::http::error::ApiError;
use crate::state::AppState;
use crate::storage::Destination;

const DEFAULT_PORT: u32 = 23;
const DEFAULT_PROTOCOL: &str = "telnet";

#[derive(Debug, Deserialize)]
pub struct DestinationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DestinationResponse {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    pub has_credentials: bool,
    pub auto_login_enabled: bool,
}

impl DestinationRequest {
    /// Normalise and bounds-check the request.
    ///
    /// This is syntactic validation only; destination *policy* (deny-lists,
    /// private ranges) applies when a connection is actually attempted.
    fn validated(self) -> Result<(String, String, u16, String), ApiError> {
        let name = self.name.trim().to_string();
        let host = self.host.trim().to_string();
        if name.is_empty() || host.is_empty() {
            return Err(ApiError::Validation("Name and host are required".into()));
        }

        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 || port > u32::from(u16::MAX) {
            return Err(ApiError::Validation(
                "Port must be between 1 and 65535".into(),
            ));
        }

        let protocol = self
            .protocol
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

        Ok((name, host, port as u16, protocol))
    }
}

/// `GET /api/v1/destinations`
pub async fn list(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Result<Json<Vec<DestinationResponse>>, ApiError> {
    let destinations = state.db.list_destinations(&owner).await?;

    let mut out = Vec::with_capacity(destinations.len());
    for dest in destinations {
        let status = state.db.get_credential_status(&dest.id).await?;
        out.push(to_response(dest, status.has_credentials, status.auto_login_enabled));
    }
    Ok(Json(out))
}

/// `POST /api/v1/destinations`
pub async fn create(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Json(req): Json<DestinationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, host, port, protocol) = req.validated()?;

    let dest = state
        .db
        .create_destination(&owner, &name, &host, port, &protocol)
        .await
        .map_err(map_unique_violation)?;

    Ok((StatusCode::CREATED, Json(to_response(dest, false, false))))
}

/// `GET /api/v1/destinations/{id}`
pub async fn get_one(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DestinationResponse>, ApiError> {
    let dest = state.db.get_destination(&id, &owner).await?;
    let status = state.db.get_credential_status(&dest.id).await?;
    Ok(Json(to_response(
        dest,
        status.has_credentials,
        status.auto_login_enabled,
    )))
}

/// `PUT /api/v1/destinations/{id}`
pub async fn update(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DestinationRequest>,
) -> Result<Json<DestinationResponse>, ApiError> {
    let (name, host, port, protocol) = req.validated()?;

    let dest = state
        .db
        .update_destination(&id, &owner, &name, &host, port, &protocol)
        .await
        .map_err(map_unique_violation)?;
    let status = state.db.get_credential_status(&dest.id).await?;
    Ok(Json(to_response(
        dest,
        status.has_credentials,
        status.auto_login_enabled,
    )))
}

/// `DELETE /api/v1/destinations/{id}`
pub async fn delete_one(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.db.delete_destination(&id, &owner).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Destination {id} not found")))
    }
}

/// `GET /api/v1/destinations/recent`
pub async fn recent(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Result<Json<Vec<DestinationResponse>>, ApiError> {
    let destinations = state.db.recent_destinations(&owner, 5).await?;

    let mut out = Vec::with_capacity(destinations.len());
    for dest in destinations {
        let status = state.db.get_credential_status(&dest.id).await?;
        out.push(to_response(dest, status.has_credentials, status.auto_login_enabled));
    }
    Ok(Json(out))
}

fn to_response(dest: Destination, has_credentials: bool, auto_login_enabled: bool) -> DestinationResponse {
    DestinationResponse {
        id: dest.id,
        name: dest.name,
        host: dest.host,
        port: dest.port as u16,
        protocol: dest.protocol,
        created_at: format_rfc3339(dest.created_at),
        updated_at: format_rfc3339(dest.updated_at),
        last_used_at: dest.last_used_at.map(format_rfc3339),
        has_credentials,
        auto_login_enabled,
    }
}

fn map_unique_violation(err: DatabaseError) -> ApiError {
    if let DatabaseError::Query(msg) = &err {
        if msg.contains("UNIQUE constraint failed") {
            return ApiError::Validation("A destination with that name already exists".into());
        }
    }
    err.into()
}
