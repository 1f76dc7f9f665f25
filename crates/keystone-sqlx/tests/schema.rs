//! Catalog introspection against SQLite.

use std::sync::Arc;

use keystone_core::{types, ColumnType, DefaultValue, MemoryCache, Params};
use keystone_sqlx::{Connection, ConnectionConfig};

async fn connect() -> Connection {
    Connection::open(ConnectionConfig::new("sqlite::memory:"))
        .await
        .expect("Failed to open in-memory SQLite")
}

async fn run(db: &Connection, sql: &str) {
    db.create_command(sql, Params::new()).execute().await.unwrap();
}

#[tokio::test]
async fn test_load_table_schema() {
    let db = connect().await;
    run(&db, "CREATE TABLE parent (id INTEGER PRIMARY KEY AUTOINCREMENT)").await;
    run(
        &db,
        "CREATE TABLE child (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER NOT NULL REFERENCES parent (id) ON DELETE CASCADE,
            code VARCHAR(16) NOT NULL UNIQUE,
            active BOOLEAN DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .await;

    let table = db
        .schema()
        .get_table_schema("child", false)
        .await
        .unwrap()
        .expect("child exists");
    assert_eq!(table.primary_key, vec!["id".to_string()]);
    assert_eq!(table.auto_increment_column().map(|c| c.name.as_str()), Some("id"));

    let code = table.column("code").unwrap();
    assert_eq!(code.abstract_type, types::STRING);
    assert_eq!(code.size, Some(16));
    assert!(!code.allow_null);

    let active = table.column("active").unwrap();
    assert_eq!(active.abstract_type, types::BOOLEAN);
    assert_eq!(active.default, Some(DefaultValue::Boolean(true)));

    let created_at = table.column("created_at").unwrap();
    assert_eq!(
        created_at.default,
        Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
    );

    assert_eq!(table.foreign_keys.len(), 1);
    assert_eq!(table.foreign_keys[0].foreign_table, "parent");
    assert_eq!(table.foreign_keys[0].columns, vec!["parent_id".to_string()]);
    assert_eq!(table.unique_constraints.len(), 1);
    assert_eq!(table.unique_constraints[0].columns, vec!["code".to_string()]);
}

#[tokio::test]
async fn test_missing_table_is_none() {
    let db = connect().await;
    assert!(db.schema().get_table_schema("nope", false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_table_names() {
    let db = connect().await;
    run(&db, "CREATE TABLE b (id INTEGER PRIMARY KEY AUTOINCREMENT)").await;
    run(&db, "CREATE TABLE a (id INTEGER)").await;
    let names = db.schema().get_table_names(None).await.unwrap();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    let tables = db.schema().get_table_schemas(None, false).await.unwrap();
    assert_eq!(tables.len(), 2);
}

#[tokio::test]
async fn test_ddl_commands_refresh_cached_metadata() {
    let db = connect().await;
    db.create_command("", Params::new())
        .create_table(
            "item",
            [
                ("id", ColumnType::from("pk")),
                ("name", ColumnType::from("string")),
            ],
            None,
        )
        .execute()
        .await
        .unwrap();
    let before = db.schema().get_table_schema("item", false).await.unwrap().unwrap();
    assert_eq!(before.columns.len(), 2);

    db.create_command("", Params::new())
        .add_column("item", "price", "decimal(10,2)")
        .execute()
        .await
        .unwrap();
    let after = db.schema().get_table_schema("item", false).await.unwrap().unwrap();
    assert_eq!(after.columns.len(), 3);
}

#[tokio::test]
async fn test_raw_ddl_needs_explicit_refresh() {
    let db = connect().await;
    run(&db, "CREATE TABLE item (id INTEGER PRIMARY KEY)").await;
    let schema = db.schema();
    assert_eq!(schema.get_table_schema("item", false).await.unwrap().unwrap().columns.len(), 1);

    run(&db, "ALTER TABLE item ADD COLUMN name TEXT").await;
    assert_eq!(schema.get_table_schema("item", false).await.unwrap().unwrap().columns.len(), 1);

    schema.refresh_table_schema("item");
    assert_eq!(schema.get_table_schema("item", false).await.unwrap().unwrap().columns.len(), 2);
}

async fn open_cached(dsn: &str, cache: Arc<MemoryCache>) -> Connection {
    Connection::open(ConnectionConfig::new(dsn).with_schema_cache(0))
        .await
        .unwrap()
        .with_cache(cache)
}

#[tokio::test]
async fn test_shared_cache_serves_other_connections() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
    let cache = Arc::new(MemoryCache::new());
    let first = open_cached(&dsn, cache.clone()).await;
    let second = open_cached(&dsn, cache.clone()).await;

    run(&first, "CREATE TABLE item (id INTEGER PRIMARY KEY)").await;
    assert!(first.schema().get_table_schema("item", false).await.unwrap().is_some());
    assert!(!cache.is_empty());

    run(&second, "ALTER TABLE item ADD COLUMN name TEXT").await;
    let cached = second.schema().get_table_schema("item", false).await.unwrap().unwrap();
    assert_eq!(cached.columns.len(), 1);

    second.schema().refresh();
    let fresh = second.schema().get_table_schema("item", false).await.unwrap().unwrap();
    assert_eq!(fresh.columns.len(), 2);
}

#[tokio::test]
async fn test_reset_auto_increment_pk() {
    let db = connect().await;
    run(&db, "CREATE TABLE T_reset (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)").await;
    run(&db, "INSERT INTO T_reset (name) VALUES ('a')").await;

    let err = db.schema().reset_auto_increment_pk("T_reset", -1).await.unwrap_err();
    assert_eq!(err.to_string(), "The value must be greater than '0'.");

    assert_eq!(db.schema().reset_auto_increment_pk("T_reset", 10).await.unwrap(), 10);
    run(&db, "INSERT INTO T_reset (name) VALUES ('b')").await;
    let last = db.schema().get_last_insert_id(None).await.unwrap();
    assert_eq!(last, Some(10));
}

#[tokio::test]
async fn test_sequence_lookups_are_not_supported_on_sqlite() {
    let db = connect().await;
    let err = db.schema().get_sequence_info("order_seq").await.unwrap_err();
    assert!(err.is_not_supported());
    let err = db
        .schema()
        .find_table_sequence_from_triggers("order")
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}
