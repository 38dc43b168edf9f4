//! HTTP/WebSocket boundary: routing and request shaping.
//!
//! Handlers translate control-plane requests into registry, storage, and
//! vault calls. The authenticated owner id is injected per request by the
//! [`auth::OwnerId`] extractor and never read from a body.

pub mod auth;
pub mod credentials;
pub mod destinations;
pub mod error;
pub mod metrics_api;
pub mod session_api;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/destinations",
            get(destinations::list).post(destinations::create),
        )
        .route("/api/v1/destinations/recent", get(destinations::recent))
        .route(
            "/api/v1/destinations/{id}",
            get(destinations::get_one)
                .put(destinations::update)
                .delete(destinations::delete_one),
        )
        .route(
            "/api/v1/destinations/{id}/credentials",
            put(credentials::set)
                .get(credentials::status)
                .delete(credentials::delete),
        )
        .route("/api/v1/session/connect", post(session_api::connect))
        .route("/api/v1/session/disconnect", post(session_api::disconnect))
        .route("/api/v1/session/status", get(session_api::status))
        .route("/api/v1/session/stream", get(session_api::stream))
        .route("/metrics", get(metrics_api::metrics))
        .with_state(state)
}
