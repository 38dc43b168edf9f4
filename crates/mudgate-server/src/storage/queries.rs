//! Destination queries.
//!
//! Every statement carries the owner in its WHERE clause; there is no
//! read-then-check anywhere in this layer.

use mudgate_core::db::unix_timestamp;

use super::db::GatewayDatabase;
use super::models::Destination;
use super::DatabaseError;

impl GatewayDatabase {
    /// Save a new destination for an owner.
    pub async fn create_destination(
        &self,
        owner_id: &str,
        name: &str,
        host: &str,
        port: u16,
        protocol: &str,
    ) -> Result<Destination, DatabaseError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO destinations (id, owner_id, name, host, port, protocol, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(name)
        .bind(host)
        .bind(i64::from(port))
        .bind(protocol)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_destination(&id, owner_id).await
    }

    /// Get a destination by id, scoped to its owner.
    pub async fn get_destination(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Destination, DatabaseError> {
        sqlx::query_as::<_, Destination>(
            "SELECT * FROM destinations WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Destination {id}")))
    }

    /// All destinations for an owner, newest first.
    pub async fn list_destinations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Destination>, DatabaseError> {
        let rows = sqlx::query_as::<_, Destination>(
            "SELECT * FROM destinations WHERE owner_id = ? ORDER BY created_at DESC, id",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Destinations with a non-null last-used timestamp, most recent first.
    pub async fn recent_destinations(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<Destination>, DatabaseError> {
        let rows = sqlx::query_as::<_, Destination>(
            "SELECT * FROM destinations \
             WHERE owner_id = ? AND last_used_at IS NOT NULL \
             ORDER BY last_used_at DESC LIMIT ?",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Update a destination's fields.
    pub async fn update_destination(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        host: &str,
        port: u16,
        protocol: &str,
    ) -> Result<Destination, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "UPDATE destinations SET name = ?, host = ?, port = ?, protocol = ?, updated_at = ? \
             WHERE id = ? AND owner_id = ?",
        )
        .bind(name)
        .bind(host)
        .bind(i64::from(port))
        .bind(protocol)
        .bind(now)
        .bind(id)
        .bind(owner_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Destination {id}")));
        }

        self.get_destination(id, owner_id).await
    }

    /// Stamp the destination as just used.
    pub async fn touch_last_used(&self, id: &str, owner_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE destinations SET last_used_at = ? WHERE id = ? AND owner_id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .bind(owner_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Delete a destination; credentials cascade.
    pub async fn delete_destination(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM destinations WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
