//! Upstream session lifecycle: one TCP session per owner, guarded by a
//! single registry.

pub mod registry;
pub mod types;

pub use registry::{RegistryConfig, SessionRegistry};
pub use types::{DisconnectReason, Session, SessionState};

use std::time::Duration;

use thiserror::Error;

use crate::policy::PolicyError;

/// Errors from session establishment and I/O.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("User already has an active session")]
    AlreadyConnected,

    #[error("Connection timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("Connection failed: {0}")]
    DialFailed(String),

    #[error("No active session")]
    NotConnected,

    #[error("Upstream closed the connection")]
    UpstreamClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
