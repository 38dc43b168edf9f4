//! mudgate gateway library.
//!
//! Browser-accessible gateway to legacy line-oriented telnet servers:
//! - destination policy (port lists, private-address blocking)
//! - option-negotiation filtering on the upstream→client path
//! - per-user token-bucket command limiting
//! - vault-backed saved credentials with optional auto-login
//! - single-session-per-owner registry with idle/hard-cap watchdogs
//! - the WebSocket relay pump and the HTTP control plane

pub mod http;
pub mod limiter;
pub mod metrics;
pub mod policy;
pub mod relay;
pub mod session;
pub mod state;
pub mod storage;
pub mod telnet;
