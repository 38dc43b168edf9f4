//! Credential queries.
//!
//! The blob and its key version always move together. Status queries never
//! touch the blob column. Owner scoping happens one level up: a caller
//! reaches a credential row only through its owner-scoped destination.

use mudgate_core::db::unix_timestamp;

use super::db::GatewayDatabase;
use super::models::{Credential, CredentialStatus};
use super::DatabaseError;

impl GatewayDatabase {
    /// Create or update the credentials for a destination.
    ///
    /// `secret` carries the freshly encrypted blob and its key version;
    /// `None` means "keep the stored blob and version, update only username
    /// and auto-login". The latter fails `NotFound` when no row exists,
    /// because there is nothing to preserve.
    pub async fn upsert_credentials(
        &self,
        destination_id: &str,
        username: &str,
        secret: Option<(&[u8], u32)>,
        auto_login: bool,
    ) -> Result<Credential, DatabaseError> {
        let now = unix_timestamp();

        match secret {
            Some((blob, key_version)) => {
                let id = uuid::Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO credentials \
                     (id, destination_id, username, encrypted_password, key_version, auto_login, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (destination_id) DO UPDATE SET \
                     username = excluded.username, \
                     encrypted_password = excluded.encrypted_password, \
                     key_version = excluded.key_version, \
                     auto_login = excluded.auto_login, \
                     updated_at = excluded.updated_at",
                )
                .bind(&id)
                .bind(destination_id)
                .bind(username)
                .bind(blob)
                .bind(i64::from(key_version))
                .bind(auto_login)
                .bind(now)
                .bind(now)
                .execute(self.pool())
                .await?;
            }
            None => {
                let result = sqlx::query(
                    "UPDATE credentials SET username = ?, auto_login = ?, updated_at = ? \
                     WHERE destination_id = ?",
                )
                .bind(username)
                .bind(auto_login)
                .bind(now)
                .bind(destination_id)
                .execute(self.pool())
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DatabaseError::NotFound(format!(
                        "Credentials for destination {destination_id}"
                    )));
                }
            }
        }

        self.get_credentials(destination_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Credentials for destination {destination_id}")))
    }

    /// The full credential row, or `None` — a destination without
    /// credentials is a valid state, not an error.
    pub async fn get_credentials(
        &self,
        destination_id: &str,
    ) -> Result<Option<Credential>, DatabaseError> {
        let row = sqlx::query_as::<_, Credential>(
            "SELECT * FROM credentials WHERE destination_id = ?",
        )
        .bind(destination_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Presence, auto-login flag, and username — never the blob.
    pub async fn get_credential_status(
        &self,
        destination_id: &str,
    ) -> Result<CredentialStatus, DatabaseError> {
        let row: Option<(String, bool)> = sqlx::query_as(
            "SELECT username, auto_login FROM credentials WHERE destination_id = ?",
        )
        .bind(destination_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(match row {
            Some((username, auto_login)) => CredentialStatus {
                has_credentials: true,
                auto_login_enabled: auto_login,
                username: Some(username),
            },
            None => CredentialStatus::absent(),
        })
    }

    /// Remove the credentials for a destination.
    pub async fn delete_credentials(&self, destination_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM credentials WHERE destination_id = ?")
            .bind(destination_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
