//! Authenticated-owner extraction.
//!
//! Identity is out of scope for the gateway: a fronting identity layer
//! authenticates the browser session and injects the opaque owner id into
//! this header. The owner never comes from the request body.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::ApiError;

/// Header carrying the server-authenticated owner id.
pub const OWNER_HEADER: &str = "x-mudgate-user";

/// The authenticated owner attached to a request.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(|owner| Self(owner.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
