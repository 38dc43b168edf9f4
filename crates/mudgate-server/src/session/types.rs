//! Session state machine types.

use std::time::SystemTime;

use serde::Serialize;

/// Lifecycle states of an upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Initial and terminal resting state.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// The upstream socket is live.
    Connected,
    /// Terminal: the dial failed.
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Whether the registry considers this owner occupied.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// The closed set of reasons a session leaves `connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    User,
    IdleTimeout,
    HardCap,
    RemoteClose,
    Error,
    BlockedPort,
    BlockedHost,
    ProtocolMismatch,
    SlowClient,
    RateLimit,
}

impl DisconnectReason {
    /// Every member, in the order they are exported to metrics.
    pub const ALL: [Self; 10] = [
        Self::User,
        Self::IdleTimeout,
        Self::HardCap,
        Self::RemoteClose,
        Self::Error,
        Self::BlockedPort,
        Self::BlockedHost,
        Self::ProtocolMismatch,
        Self::SlowClient,
        Self::RateLimit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::IdleTimeout => "idle_timeout",
            Self::HardCap => "hard_cap",
            Self::RemoteClose => "remote_close",
            Self::Error => "error",
            Self::BlockedPort => "blocked_port",
            Self::BlockedHost => "blocked_host",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::SlowClient => "slow_client",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Parse a reason string; anything outside the closed set is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_str() == raw)
    }

    pub(crate) fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|r| *r == self)
            .unwrap_or_default()
    }
}

/// In-memory snapshot of one owner's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub owner: String,
    pub host: String,
    pub port: u16,
    pub state: SessionState,
    pub connected_at: Option<SystemTime>,
    pub last_activity_at: Option<SystemTime>,
    pub disconnect_reason: Option<DisconnectReason>,
    /// Human-readable dial failure, kept separately from the reason code.
    pub last_error: Option<String>,
}

impl Session {
    /// The resting session returned for owners the registry has never seen.
    pub fn idle(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            host: String::new(),
            port: 0,
            state: SessionState::Disconnected,
            connected_at: None,
            last_activity_at: None,
            disconnect_reason: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_roundtrip() {
        for reason in DisconnectReason::ALL {
            assert_eq!(DisconnectReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(DisconnectReason::parse("power_failure"), None);
    }

    #[test]
    fn active_states() {
        assert!(SessionState::Connecting.is_active());
        assert!(SessionState::Connected.is_active());
        assert!(!SessionState::Disconnected.is_active());
        assert!(!SessionState::Error.is_active());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
