//! Persistent storage: saved destinations and their encrypted credentials.

pub mod db;
pub mod models;
mod queries;
mod queries_credentials;

#[cfg(test)]
mod tests;

pub use db::GatewayDatabase;
pub use models::{Credential, CredentialStatus, Destination};
pub use mudgate_core::db::DatabaseError;
