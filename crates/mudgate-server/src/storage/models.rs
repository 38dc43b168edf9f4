//! Data models for gateway storage.

use serde::{Deserialize, Serialize};

/// A saved upstream destination, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Destination {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_used_at: Option<i64>,
}

/// Encrypted login credentials, one-to-one with a destination.
///
/// `encrypted_password` and `key_version` are inseparable: decryption must
/// use the stored version. This struct never crosses the API boundary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    pub id: String,
    pub destination_id: String,
    pub username: String,
    pub encrypted_password: Vec<u8>,
    pub key_version: i64,
    pub auto_login: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What the control plane may reveal about stored credentials.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialStatus {
    pub has_credentials: bool,
    pub auto_login_enabled: bool,
    pub username: Option<String>,
}

impl CredentialStatus {
    pub fn absent() -> Self {
        Self {
            has_credentials: false,
            auto_login_enabled: false,
            username: None,
        }
    }
}
