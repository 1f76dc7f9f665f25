//! Database session storage on SQLite.

use keystone_core::Params;
use keystone_sqlx::{Connection, ConnectionConfig, DbSession, SessionHandler};

async fn connect() -> Connection {
    Connection::open(ConnectionConfig::new("sqlite::memory:").with_table_prefix("app_"))
        .await
        .expect("Failed to open in-memory SQLite")
}

#[tokio::test]
async fn test_write_read_destroy() {
    let db = connect().await;
    let session = DbSession::new(&db);
    session.create_table().await.unwrap();
    assert!(session.open("", "SID").await.unwrap());

    assert_eq!(session.read("abc").await.unwrap(), "");
    session.write("abc", "user=1").await.unwrap();
    assert_eq!(session.read("abc").await.unwrap(), "user=1");
    session.write("abc", "user=2").await.unwrap();
    assert_eq!(session.read("abc").await.unwrap(), "user=2");

    let stored = db
        .create_command("SELECT COUNT(*) FROM app_session", Params::new())
        .query_scalar()
        .await
        .unwrap()
        .and_then(|v| v.as_i64());
    assert_eq!(stored, Some(1));

    session.destroy("abc").await.unwrap();
    assert_eq!(session.read("abc").await.unwrap(), "");
    assert!(session.close().await.unwrap());
    assert!(!session.is_regenerate_id());
}

#[tokio::test]
async fn test_expired_sessions_are_not_read_and_get_collected() {
    let db = connect().await;
    let session = DbSession::new(&db).with_timeout(-10);
    session.create_table().await.unwrap();
    session.write("old", "data").await.unwrap();
    assert_eq!(session.read("old").await.unwrap(), "");
    assert_eq!(session.gc(0).await.unwrap(), 1);
}

#[tokio::test]
async fn test_strict_mode_forces_regeneration_of_unknown_ids() {
    let db = connect().await;
    let session = DbSession::new(&db).with_strict_mode(true);
    session.create_table().await.unwrap();

    assert_eq!(session.read("forged").await.unwrap(), "");
    assert!(session.is_regenerate_id());

    assert!(session.write("forged", "payload").await.unwrap());
    let stored = db
        .create_command("SELECT COUNT(*) FROM {{%session}}", Params::new())
        .query_scalar()
        .await
        .unwrap()
        .and_then(|v| v.as_i64());
    assert_eq!(stored, Some(0));

    session.write("fresh", "payload").await.unwrap();
    assert_eq!(session.read("fresh").await.unwrap(), "payload");
}

#[tokio::test]
async fn test_strict_mode_forces_regeneration_of_expired_ids() {
    let db = connect().await;
    let session = DbSession::new(&db).with_strict_mode(true);
    session.create_table().await.unwrap();
    db.create_command(
        "INSERT INTO {{%session}} (id, expire, data) VALUES ('old', 1, 'stale')",
        Params::new(),
    )
    .execute()
    .await
    .unwrap();

    assert_eq!(session.read("old").await.unwrap(), "");
    assert!(session.is_regenerate_id());

    assert!(session.write("old", "payload").await.unwrap());
    let data = db
        .create_command("SELECT data FROM {{%session}} WHERE id = 'old'", Params::new())
        .query_scalar()
        .await
        .unwrap()
        .and_then(|v| v.to_text());
    assert_eq!(data.as_deref(), Some("stale"));
}
