//! Metrics exposition.

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::http::error::ApiError;
use crate::state::AppState;

/// `GET /metrics` — Prometheus text snapshot.
///
/// When an admin secret is configured the caller must present it as a
/// bearer token; without one the deployment is expected to front the
/// endpoint itself.
pub async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(secret) = &state.admin_metrics_secret {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;

        if presented != secret {
            return Err(ApiError::Forbidden);
        }
    }

    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    ))
}
