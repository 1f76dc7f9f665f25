//! Command execution against an in-memory SQLite database.

use keystone_core::{Condition, Params, SqlValue, UpsertUpdate};
use keystone_sqlx::{Connection, ConnectionConfig, Error, InsertResult};

async fn connect() -> Connection {
    Connection::open(ConnectionConfig::new("sqlite::memory:"))
        .await
        .expect("Failed to open in-memory SQLite")
}

async fn create_customer(db: &Connection) {
    db.create_command(
        "CREATE TABLE customer (id INTEGER PRIMARY KEY AUTOINCREMENT, email VARCHAR(128) NOT NULL UNIQUE, name VARCHAR(128))",
        Params::new(),
    )
    .execute()
    .await
    .unwrap();
}

async fn count(db: &Connection, table: &str) -> i64 {
    db.create_command(format!("SELECT COUNT(*) FROM {{{{{table}}}}}"), Params::new())
        .query_scalar()
        .await
        .unwrap()
        .and_then(|v| v.as_i64())
        .unwrap()
}

#[tokio::test]
async fn test_trailing_semicolon_is_one_statement() {
    let db = connect().await;
    create_customer(&db).await;
    let affected = db
        .create_command(
            "INSERT INTO customer (email, name) VALUES (:email, :name);",
            Params::new().with("email", "a@example.com").with("name", "Ann"),
        )
        .execute()
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(count(&db, "customer").await, 1);
}

#[tokio::test]
async fn test_script_binds_each_statement_separately() {
    let db = connect().await;
    create_customer(&db).await;
    db.create_command(
        "INSERT INTO customer (email) VALUES (:a); INSERT INTO customer (email) VALUES (:b)",
        Params::new().with("a", "a@example.com").with("b", "b@example.com"),
    )
    .execute()
    .await
    .unwrap();
    assert_eq!(count(&db, "customer").await, 2);
    assert_eq!(db.transaction_level(), 0);
}

#[tokio::test]
async fn test_positional_params_single_statement() {
    let db = connect().await;
    create_customer(&db).await;
    let params: Params = [("1", "a@example.com"), ("2", "Ann")].into_iter().collect();
    let affected = db
        .create_command("INSERT INTO customer (email, name) VALUES (?, ?)", params)
        .execute()
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let name = db
        .create_command(
            "SELECT name FROM customer WHERE email = :email",
            Params::new().with("email", "a@example.com"),
        )
        .query_scalar()
        .await
        .unwrap();
    assert_eq!(name, Some(SqlValue::Text("Ann".into())));
}

#[tokio::test]
async fn test_positional_params_across_statements() {
    let db = connect().await;
    create_customer(&db).await;
    let params: Params = [("1", "a@example.com"), ("2", "b@example.com"), ("3", "a@example.com")]
        .into_iter()
        .collect();
    let affected = db
        .create_command(
            "INSERT INTO customer (email) VALUES (?); INSERT INTO customer (email) VALUES (?); DELETE FROM customer WHERE email = ?",
            params,
        )
        .execute()
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let emails = db
        .create_command("SELECT email FROM customer", Params::new())
        .query_column()
        .await
        .unwrap();
    assert_eq!(emails, vec![SqlValue::Text("b@example.com".into())]);
}

#[tokio::test]
async fn test_failing_script_rolls_back() {
    let db = connect().await;
    create_customer(&db).await;
    let result = db
        .create_command(
            "INSERT INTO customer (email) VALUES ('a@example.com'); INSERT INTO missing (x) VALUES (1)",
            Params::new(),
        )
        .execute()
        .await;
    assert!(matches!(result, Err(Error::Database(_))));
    assert_eq!(count(&db, "customer").await, 0);
}

#[tokio::test]
async fn test_upsert_inserts_then_updates() {
    let db = connect().await;
    create_customer(&db).await;
    for name in ["Ann", "Anna"] {
        db.create_command("", Params::new())
            .upsert("customer", [("email", "a@example.com"), ("name", name)], true)
            .await
            .unwrap()
            .execute()
            .await
            .unwrap();
    }
    assert_eq!(count(&db, "customer").await, 1);
    let name = db
        .create_command("SELECT name FROM customer", Params::new())
        .query_scalar()
        .await
        .unwrap();
    assert_eq!(name, Some(SqlValue::Text("Anna".into())));
}

#[tokio::test]
async fn test_upsert_without_update_keeps_existing_row() {
    let db = connect().await;
    create_customer(&db).await;
    for name in ["Ann", "Anna"] {
        db.create_command("", Params::new())
            .upsert(
                "customer",
                [("email", "a@example.com"), ("name", name)],
                UpsertUpdate::None,
            )
            .await
            .unwrap()
            .execute()
            .await
            .unwrap();
    }
    let names = db
        .create_command("SELECT name FROM customer", Params::new())
        .query_column()
        .await
        .unwrap();
    assert_eq!(names, vec![SqlValue::Text("Ann".into())]);
}

#[tokio::test]
async fn test_insert_with_returning_pks_reads_generated_id() {
    let db = connect().await;
    create_customer(&db).await;
    for (expected, email) in [(1, "a@example.com"), (2, "b@example.com")] {
        let result = db
            .create_command("", Params::new())
            .insert_with_returning_pks("customer", [("email", email)])
            .await
            .unwrap();
        let keys = result.keys().expect("customer has a primary key");
        assert_eq!(keys.get_i64("id"), Some(expected));
    }
}

#[tokio::test]
async fn test_insert_with_returning_pks_without_key_counts_rows() {
    let db = connect().await;
    db.create_command("CREATE TABLE log (message TEXT)", Params::new())
        .execute()
        .await
        .unwrap();
    let result = db
        .create_command("", Params::new())
        .insert_with_returning_pks("log", [("message", "hello")])
        .await
        .unwrap();
    assert_eq!(result, InsertResult::Affected(1));
}

#[tokio::test]
async fn test_batch_update_and_delete() {
    let db = connect().await;
    create_customer(&db).await;
    db.create_command("", Params::new())
        .batch_insert(
            "customer",
            &["email", "name"],
            [["a@example.com", "Ann"], ["b@example.com", "Bob"]],
        )
        .await
        .unwrap()
        .execute()
        .await
        .unwrap();
    let updated = db
        .create_command("", Params::new())
        .update(
            "customer",
            [("name", "Robert")],
            Some(&Condition::eq("email", "b@example.com")),
        )
        .await
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let deleted = db
        .create_command("", Params::new())
        .delete("customer", Some(&Condition::eq("name", "Ann")))
        .execute()
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let rows = db
        .create_command("SELECT email, name FROM customer", Params::new())
        .query_all()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name"), Some("Robert"));
}

#[tokio::test]
async fn test_raw_sql_inlines_values() {
    let db = connect().await;
    let command = db.create_command(
        "SELECT * FROM {{customer}} WHERE [[name]] = :name",
        Params::new().with("name", "O'Brien"),
    );
    assert_eq!(
        command.raw_sql(),
        "SELECT * FROM `customer` WHERE `name` = 'O''Brien'"
    );
}

#[tokio::test]
async fn test_transaction_savepoints() {
    let db = connect().await;
    create_customer(&db).await;
    let insert = |email: &'static str| {
        db.create_command(
            "INSERT INTO customer (email) VALUES (:email)",
            Params::new().with("email", email),
        )
    };

    db.begin_transaction().await.unwrap();
    insert("a@example.com").execute().await.unwrap();
    db.begin_transaction().await.unwrap();
    assert_eq!(db.transaction_level(), 2);
    insert("b@example.com").execute().await.unwrap();
    db.roll_back().await.unwrap();
    db.commit().await.unwrap();

    assert_eq!(db.transaction_level(), 0);
    assert_eq!(count(&db, "customer").await, 1);
}

#[tokio::test]
async fn test_transaction_closure_rolls_back_on_error() {
    let db = connect().await;
    create_customer(&db).await;
    let result: keystone_sqlx::Result<()> = db
        .transaction(|db| async move {
            db.create_command("INSERT INTO customer (email) VALUES ('a@example.com')", Params::new())
                .execute()
                .await?;
            db.create_command("INSERT INTO customer (email) VALUES ('a@example.com')", Params::new())
                .execute()
                .await?;
            Ok(())
        })
        .await;
    assert!(result.is_err());
    assert_eq!(db.transaction_level(), 0);
    assert_eq!(count(&db, "customer").await, 0);
}

#[tokio::test]
async fn test_commit_without_transaction_is_invalid() {
    let db = connect().await;
    let err = db.commit().await.unwrap_err();
    assert_eq!(err.to_string(), "No transaction is active.");
}

#[tokio::test]
async fn test_unbundled_driver_is_rejected() {
    let err = Connection::open(ConnectionConfig::new("sqlsrv:Server=localhost;Database=app"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(keystone_core::Error::InvalidConfig(_))
    ));
}
