//! Shared application state handed to every handler.

use std::sync::Arc;

use mudgate_vault::KeyRing;

use crate::limiter::CommandLimiters;
use crate::metrics::GatewayMetrics;
use crate::session::SessionRegistry;
use crate::storage::GatewayDatabase;

#[derive(Clone)]
pub struct AppState {
    pub db: GatewayDatabase,
    pub registry: Arc<SessionRegistry>,
    pub vault: Arc<KeyRing>,
    pub metrics: Arc<GatewayMetrics>,
    pub limiters: Arc<CommandLimiters>,
    /// Browser frame size limit, enforced before parsing.
    pub max_frame_bytes: usize,
    /// Bearer secret for `/metrics`; `None` leaves it open.
    pub admin_metrics_secret: Option<String>,
}
