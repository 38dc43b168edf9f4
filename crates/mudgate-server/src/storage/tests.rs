//! Storage layer tests.

use super::db::GatewayDatabase;
use super::DatabaseError;

async fn test_db() -> GatewayDatabase {
    GatewayDatabase::open_in_memory().await.unwrap()
}

// === Destination tests ===

#[tokio::test]
async fn create_and_get_destination() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    assert_eq!(dest.owner_id, "u1");
    assert_eq!(dest.name, "Aardwolf");
    assert_eq!(dest.host, "aardmud.org");
    assert_eq!(dest.port, 4000);
    assert_eq!(dest.protocol, "telnet");
    assert!(dest.last_used_at.is_none());

    let fetched = db.get_destination(&dest.id, "u1").await.unwrap();
    assert_eq!(fetched.id, dest.id);
}

#[tokio::test]
async fn cross_owner_get_fails() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    let result = db.get_destination(&dest.id, "u2").await;
    assert!(matches!(result, Err(DatabaseError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_name_per_owner_rejected() {
    let db = test_db().await;
    db.create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    let result = db
        .create_destination("u1", "Aardwolf", "other.example.com", 23, "telnet")
        .await;
    assert!(result.is_err());

    // Same name under another owner is fine.
    db.create_destination("u2", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();
}

#[tokio::test]
async fn list_is_scoped_to_owner() {
    let db = test_db().await;
    db.create_destination("u1", "One", "one.example.com", 23, "telnet")
        .await
        .unwrap();
    db.create_destination("u1", "Two", "two.example.com", 23, "telnet")
        .await
        .unwrap();
    db.create_destination("u2", "Theirs", "three.example.com", 23, "telnet")
        .await
        .unwrap();

    let mine = db.list_destinations("u1").await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|d| d.owner_id == "u1"));
}

#[tokio::test]
async fn recent_orders_by_last_used_and_limits() {
    let db = test_db().await;
    let mut ids = Vec::new();
    for i in 0..7 {
        let dest = db
            .create_destination("u1", &format!("mud-{i}"), "mud.example.com", 4000, "telnet")
            .await
            .unwrap();
        ids.push(dest.id);
    }

    // Stamp all but the first with distinct, increasing last-used times.
    for (i, id) in ids.iter().enumerate().skip(1) {
        sqlx::query("UPDATE destinations SET last_used_at = ? WHERE id = ?")
            .bind(1000 + i as i64)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    let recent = db.recent_destinations("u1", 5).await.unwrap();
    assert_eq!(recent.len(), 5);
    // Never-used destination is excluded.
    assert!(recent.iter().all(|d| d.id != ids[0]));
    // Most recently used first.
    assert_eq!(recent[0].id, ids[6]);
    assert!(recent.windows(2).all(|w| w[0].last_used_at >= w[1].last_used_at));
}

#[tokio::test]
async fn touch_last_used_sets_timestamp() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();
    assert!(dest.last_used_at.is_none());

    db.touch_last_used(&dest.id, "u1").await.unwrap();
    let touched = db.get_destination(&dest.id, "u1").await.unwrap();
    assert!(touched.last_used_at.is_some());

    // Cross-owner touch is a silent no-op on someone else's row.
    db.touch_last_used(&dest.id, "u2").await.unwrap();
}

#[tokio::test]
async fn update_destination_scoped_to_owner() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    let updated = db
        .update_destination(&dest.id, "u1", "Aardwolf2", "aardmud.org", 23, "telnet")
        .await
        .unwrap();
    assert_eq!(updated.name, "Aardwolf2");
    assert_eq!(updated.port, 23);

    let result = db
        .update_destination(&dest.id, "u2", "Stolen", "evil.example.com", 23, "telnet")
        .await;
    assert!(matches!(result, Err(DatabaseError::NotFound(_))));
}

#[tokio::test]
async fn delete_destination_scoped_to_owner() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    assert!(!db.delete_destination(&dest.id, "u2").await.unwrap());
    assert!(db.delete_destination(&dest.id, "u1").await.unwrap());
    assert!(!db.delete_destination(&dest.id, "u1").await.unwrap());
}

// === Credential tests ===

#[tokio::test]
async fn credentials_absent_is_not_an_error() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    assert!(db.get_credentials(&dest.id).await.unwrap().is_none());
    let status = db.get_credential_status(&dest.id).await.unwrap();
    assert!(!status.has_credentials);
    assert!(!status.auto_login_enabled);
    assert!(status.username.is_none());
}

#[tokio::test]
async fn upsert_creates_then_replaces() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    let cred = db
        .upsert_credentials(&dest.id, "mary", Some((b"blob-v1", 1)), true)
        .await
        .unwrap();
    assert_eq!(cred.username, "mary");
    assert_eq!(cred.encrypted_password, b"blob-v1");
    assert_eq!(cred.key_version, 1);
    assert!(cred.auto_login);

    let replaced = db
        .upsert_credentials(&dest.id, "mary", Some((b"blob-v2", 2)), false)
        .await
        .unwrap();
    assert_eq!(replaced.encrypted_password, b"blob-v2");
    assert_eq!(replaced.key_version, 2);
    assert!(!replaced.auto_login);
    // Still one row per destination.
    assert_eq!(replaced.destination_id, dest.id);
}

#[tokio::test]
async fn empty_password_update_preserves_blob_bitwise() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    db.upsert_credentials(&dest.id, "mary", Some((b"sealed-bytes", 3)), false)
        .await
        .unwrap();

    let updated = db
        .upsert_credentials(&dest.id, "maryann", None, true)
        .await
        .unwrap();

    assert_eq!(updated.username, "maryann");
    assert!(updated.auto_login);
    assert_eq!(updated.encrypted_password, b"sealed-bytes");
    assert_eq!(updated.key_version, 3);
}

#[tokio::test]
async fn metadata_update_without_existing_row_fails() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();

    let result = db.upsert_credentials(&dest.id, "mary", None, true).await;
    assert!(matches!(result, Err(DatabaseError::NotFound(_))));
}

#[tokio::test]
async fn status_reflects_row_without_exposing_blob() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();
    db.upsert_credentials(&dest.id, "mary", Some((b"secret", 1)), true)
        .await
        .unwrap();

    let status = db.get_credential_status(&dest.id).await.unwrap();
    assert!(status.has_credentials);
    assert!(status.auto_login_enabled);
    assert_eq!(status.username.as_deref(), Some("mary"));
}

#[tokio::test]
async fn delete_credentials_leaves_destination() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();
    db.upsert_credentials(&dest.id, "mary", Some((b"secret", 1)), true)
        .await
        .unwrap();

    assert!(db.delete_credentials(&dest.id).await.unwrap());
    assert!(!db.delete_credentials(&dest.id).await.unwrap());
    db.get_destination(&dest.id, "u1").await.unwrap();
}

#[tokio::test]
async fn destination_delete_cascades_to_credentials() {
    let db = test_db().await;
    let dest = db
        .create_destination("u1", "Aardwolf", "aardmud.org", 4000, "telnet")
        .await
        .unwrap();
    db.upsert_credentials(&dest.id, "mary", Some((b"secret", 1)), true)
        .await
        .unwrap();

    assert!(db.delete_destination(&dest.id, "u1").await.unwrap());
    assert!(db.get_credentials(&dest.id).await.unwrap().is_none());
}
