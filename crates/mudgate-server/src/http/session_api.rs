//! Session control plane: connect, disconnect, status, and the WebSocket
//! stream upgrade.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroize;

use mudgate_core::db::format_rfc3339;
use mudgate_vault::{KeyRing, VaultError};

use crate::http::auth::OwnerId;
use crate::http::error::ApiError;
use crate::relay;
use crate::session::{DisconnectReason, Session, SessionRegistry, SessionState};
use crate::state::AppState;
use crate::storage::Credential;

const DEFAULT_PORT: u32 = 23;

/// How long after connect before auto-login credentials are written, giving
/// the upstream a moment to present its login prompt.
const AUTO_LOGIN_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u32>,
    /// Connect to a saved destination instead of an ad-hoc host/port.
    #[serde(default)]
    pub destination_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub state: SessionState,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Default)]
pub struct DisconnectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub state: SessionState,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect_reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// `POST /api/v1/session/connect`
///
/// With a `destination_id` this ties the whole flow together: owner-scoped
/// lookup, protocol check, dial, last-used touch, and optional auto-login.
pub async fn connect(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let (host, port, destination) = match &req.destination_id {
        Some(dest_id) => {
            let dest = state.db.get_destination(dest_id, &owner).await?;
            if dest.protocol != "telnet" {
                state.metrics.inc_protocol_mismatch();
                return Err(ApiError::Validation(format!(
                    "Protocol \"{}\" is not supported",
                    dest.protocol
                )));
            }
            (dest.host.clone(), dest.port as u32, Some(dest))
        }
        None => {
            let host = req
                .host
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ApiError::Validation("Host is required".into()))?
                .to_string();
            (host, req.port.unwrap_or(DEFAULT_PORT), None)
        }
    };

    info!(%owner, %host, port, "Connect request");
    let session = state.registry.connect(&owner, &host, port).await?;

    if let Some(dest) = destination {
        if let Err(err) = state.db.touch_last_used(&dest.id, &owner).await {
            warn!(%owner, destination = %dest.id, %err, "Failed to stamp last-used");
        }

        match state.db.get_credentials(&dest.id).await {
            Ok(Some(cred)) if cred.auto_login => {
                match decrypt_password(&state.vault, &cred) {
                    Ok(password) => {
                        schedule_auto_login(
                            Arc::clone(&state.registry),
                            owner.clone(),
                            cred.username.clone(),
                            password,
                        );
                    }
                    // The session stays up; the user can still log in by
                    // hand. The specific failure kind stays server-side.
                    Err(err) => {
                        warn!(%owner, destination = %dest.id, %err, "Auto-login decryption failed")
                    }
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%owner, destination = %dest.id, %err, "Credential lookup failed"),
        }
    }

    Ok(Json(ConnectResponse {
        state: session.state,
        host: session.host,
        port: session.port,
    }))
}

/// `POST /api/v1/session/disconnect`
pub async fn disconnect(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    body: Option<Json<DisconnectRequest>>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let reason = match req.reason.as_deref() {
        None | Some("") => DisconnectReason::User,
        Some(raw) => DisconnectReason::parse(raw)
            .ok_or_else(|| ApiError::Validation(format!("Unknown disconnect reason \"{raw}\"")))?,
    };

    let session = state.registry.disconnect(&owner, reason).await?;
    Ok(Json(DisconnectResponse {
        state: session.state,
        reason: reason.as_str(),
    }))
}

/// `GET /api/v1/session/status`
pub async fn status(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Json<StatusResponse> {
    Json(to_status(state.registry.status(&owner)))
}

/// `GET /api/v1/session/stream` — upgrade to the browser channel.
pub async fn stream(
    ws: WebSocketUpgrade,
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Response {
    // Hard transport backstop; the per-frame limit inside the relay yields
    // a proper error frame instead of killing the socket.
    let transport_cap = state.max_frame_bytes.saturating_mul(2);
    ws.max_message_size(transport_cap)
        .on_upgrade(move |socket| relay::serve(socket, owner, state))
}

fn to_status(session: Session) -> StatusResponse {
    let connected = session.state == SessionState::Connected;
    StatusResponse {
        state: session.state,
        host: connected.then_some(session.host),
        port: connected.then_some(session.port),
        connected_at: session.connected_at.filter(|_| connected).map(to_rfc3339),
        last_activity_at: session.last_activity_at.filter(|_| connected).map(to_rfc3339),
        disconnect_reason: session.disconnect_reason.map(DisconnectReason::as_str),
        last_error: session.last_error,
    }
}

fn to_rfc3339(t: std::time::SystemTime) -> String {
    let secs = t
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    format_rfc3339(secs)
}

fn decrypt_password(vault: &KeyRing, cred: &Credential) -> Result<String, VaultError> {
    // Rows whose key version was lost in an old migration carry a
    // non-positive version and fall back to trying every key.
    let plaintext = if cred.key_version > 0 {
        vault.decrypt(&cred.encrypted_password, cred.key_version as u32)?
    } else {
        vault.decrypt_any(&cred.encrypted_password)?
    };
    Ok(String::from_utf8_lossy(&plaintext).into_owned())
}

/// Write `username\r\npassword\r\n` to the upstream after a short grace,
/// ahead of any client data frame.
fn schedule_auto_login(
    registry: Arc<SessionRegistry>,
    owner: String,
    username: String,
    mut password: String,
) {
    tokio::spawn(async move {
        tokio::time::sleep(AUTO_LOGIN_GRACE).await;

        if !username.is_empty() && registry.write(&owner, &username).await.is_err() {
            password.zeroize();
            return;
        }
        if registry.write(&owner, &password).await.is_err() {
            warn!(%owner, "Auto-login write failed");
        }
        password.zeroize();
    });
}
