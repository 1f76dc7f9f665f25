use keystone_core::{DriverName, Params};
use keystone_migrate::prelude::*;
use keystone_sqlx::{Connection, ConnectionConfig};

async fn connect(prefix: &str) -> Connection {
    Connection::open(ConnectionConfig::new("sqlite::memory:").with_table_prefix(prefix))
        .await
        .expect("Failed to open in-memory SQLite")
}

#[tokio::test]
async fn test_apply_and_roll_back_i18n_tables() {
    let db = connect("tr_").await;
    let executor = MigrationExecutor::new(&db);
    executor.init().await.unwrap();

    let migrations = i18n::migrations(DriverName::Sqlite);
    executor.apply_all(&migrations).await.unwrap();

    let schema = db.schema();
    let source = schema
        .get_table_schema("{{%source_message}}", false)
        .await
        .unwrap()
        .expect("source_message exists");
    assert_eq!(source.name, "tr_source_message");
    assert_eq!(source.primary_key, vec!["id".to_string()]);
    assert!(source.column("id").unwrap().auto_increment);

    let message = schema
        .get_table_schema("{{%message}}", false)
        .await
        .unwrap()
        .expect("message exists");
    assert!(!message.column("language").unwrap().allow_null);
    assert_eq!(message.column("language").unwrap().size, Some(16));
    assert!(message.foreign_keys.is_empty());

    db.create_command(
        "INSERT INTO {{%source_message}} ([[category]], [[message]]) VALUES (:category, :message)",
        Params::new()
            .with("category", "app")
            .with("message", "Hello"),
    )
    .execute()
    .await
    .unwrap();
    let category = db
        .create_command(
            "SELECT [[category]] FROM {{%source_message}} WHERE [[message]] = :message",
            Params::new().with("message", "Hello"),
        )
        .query_scalar()
        .await
        .unwrap();
    assert_eq!(category.and_then(|v| v.to_text()), Some("app".to_string()));

    assert!(executor
        .is_applied(i18n::APP, i18n::INIT_MIGRATION)
        .await
        .unwrap());
    assert!(executor.pending(&migrations).await.unwrap().is_empty());

    executor.rollback_all(&migrations).await.unwrap();
    assert!(schema
        .get_table_schema("{{%message}}", true)
        .await
        .unwrap()
        .is_none());
    assert!(schema
        .get_table_schema("{{%source_message}}", true)
        .await
        .unwrap()
        .is_none());
    assert_eq!(executor.history().count_applied().await.unwrap(), 0);
}

#[tokio::test]
async fn test_history_uses_table_prefix() {
    let db = connect("app_").await;
    let executor = MigrationExecutor::new(&db);
    executor.init().await.unwrap();
    executor
        .apply(&i18n::init_migration(DriverName::Sqlite))
        .await
        .unwrap();

    let rows = db
        .create_command("SELECT app, name FROM app_migration", Params::new())
        .query_all()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_string("name").as_deref(), Some(i18n::INIT_MIGRATION));
}

#[tokio::test]
async fn test_constraint_operations_fail_on_sqlite() {
    let db = connect("").await;
    let executor = MigrationExecutor::new(&db);

    let err = executor
        .sql_for(&i18n::init_migration(DriverName::Pgsql))
        .unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Db(keystone_sqlx::Error::Core(ref e)) if e.is_not_supported()
    ));
}

#[test]
fn test_every_dialect_renders_the_bootstrap() {
    for driver in [
        DriverName::Mysql,
        DriverName::Pgsql,
        DriverName::Sqlsrv,
        DriverName::Oci,
    ] {
        let qb = keystone_core::QueryBuilder::new(driver.driver()).with_table_prefix("tr_");
        let migration = i18n::init_migration(driver);
        assert_eq!(migration.operations.len(), 6);
        for operation in &migration.operations {
            let sql = operation.render(&qb).unwrap();
            assert!(!sql.contains("{{"), "{driver:?}: {sql}");
        }
        let reverse = migration.reverse_operations().unwrap();
        for operation in &reverse {
            operation.render(&qb).unwrap();
        }
    }
}
