//! Shared plumbing for the mudgate workspace:
//! - environment-driven configuration
//! - `SQLite` pool helpers and `DatabaseError`
//! - tracing/logging initialization

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
