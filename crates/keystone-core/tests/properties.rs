//! Cross-module behaviour through the public API.

use keystone_core::tokenizer::{bind_positional, split_with_params};
use keystone_core::{
    types, ColumnSchema, DefaultValue, DriverName, InsertSource, Params, PlaceholderStyle,
    QueryBuilder, SequenceOptions, SqlValue, TableSchema, UpsertUpdate,
};

const ALL: [DriverName; 5] = [
    DriverName::Sqlite,
    DriverName::Mysql,
    DriverName::Pgsql,
    DriverName::Sqlsrv,
    DriverName::Oci,
];

fn customer() -> TableSchema {
    let mut id = ColumnSchema::new("id", types::PK, "integer");
    id.is_primary_key = true;
    id.auto_increment = true;
    TableSchema::new(None, "customer")
        .with_column(id)
        .with_column(ColumnSchema::new("email", types::STRING, "varchar(128)"))
        .with_column(ColumnSchema::new("name", types::STRING, "varchar(128)"))
        .with_unique("uq_customer_email", &["email"])
}

#[test]
fn test_every_placeholder_has_exactly_one_param() {
    let table = customer();
    for name in ALL {
        let qb = QueryBuilder::new(name.driver()).with_schema(&table);
        let mut params = Params::new();
        let sql = qb.upsert(
            "customer",
            [("email", "a@example.com"), ("name", "Ann")],
            UpsertUpdate::All,
            &mut params,
        );
        let syntax = name.driver().syntax();
        let referenced = keystone_core::tokenizer::placeholder_names(&sql, syntax);
        assert_eq!(referenced.len(), params.len(), "{name}: {sql}");
        for placeholder in referenced {
            assert!(params.contains(placeholder), "{name}: {placeholder}");
        }
    }
}

#[test]
fn test_sequence_round_trip_or_not_supported() {
    for name in ALL {
        let qb = QueryBuilder::new(name.driver());
        let created = qb.create_sequence("order_seq", 1, 1, &SequenceOptions::default());
        let dropped = qb.drop_sequence("order_seq");
        match name {
            DriverName::Sqlite | DriverName::Mysql => {
                assert!(created.unwrap_err().is_not_supported());
                assert!(dropped.unwrap_err().is_not_supported());
            }
            _ => {
                assert!(created.unwrap().starts_with("CREATE SEQUENCE "));
                assert!(dropped.unwrap().starts_with("DROP SEQUENCE "));
            }
        }
    }
}

#[test]
fn test_default_values_insert_binds_nothing() {
    for name in ALL {
        let mut params = Params::new();
        let sql = QueryBuilder::new(name.driver()).insert(
            "customer",
            InsertSource::Values(Vec::new()),
            &mut params,
        );
        assert!(sql.starts_with("INSERT INTO "), "{sql}");
        assert!(params.is_empty());
    }
}

#[test]
fn test_sqlite_upsert_splits_into_two_statements_sharing_params() {
    let table = customer();
    let driver = DriverName::Sqlite.driver();
    let qb = QueryBuilder::new(driver).with_schema(&table);
    let mut params = Params::new();
    let sql = qb.upsert(
        "customer",
        [("email", "a@example.com"), ("name", "Ann")],
        true,
        &mut params,
    );
    let statements = split_with_params(&sql, &params, driver.syntax());
    assert_eq!(statements.len(), 2);
    assert!(statements[0].sql.starts_with("WITH "));
    assert!(statements[1].sql.starts_with("INSERT OR IGNORE "));
    for statement in &statements {
        assert_eq!(statement.params.len(), 2);
    }
}

#[test]
fn test_trailing_semicolon_is_one_statement() {
    let params = Params::new().with("id", 1);
    let statements = split_with_params(
        "DELETE FROM t WHERE id = :id;",
        &params,
        DriverName::Sqlite.driver().syntax(),
    );
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].sql, "DELETE FROM t WHERE id = :id");
}

#[test]
fn test_batch_insert_binds_for_postgres() {
    let driver = DriverName::Pgsql.driver();
    let mut params = Params::new();
    let sql = QueryBuilder::new(driver).batch_insert(
        "customer",
        &["name", "email"],
        [["a", "a@x"], ["b", "b@x"]],
        &mut params,
    );
    let (rewritten, values) =
        bind_positional(&sql, &params, PlaceholderStyle::Dollar, driver.syntax());
    assert_eq!(
        rewritten,
        "INSERT INTO \"customer\" (\"name\", \"email\") VALUES ($1, $2), ($3, $4)"
    );
    assert_eq!(values[2], SqlValue::Text("b".into()));
}

#[test]
fn test_current_timestamp_default_depends_on_column_type() {
    let timestamp = ColumnSchema::new("created_at", types::TIMESTAMP, "timestamp");
    assert_eq!(
        timestamp.normalize_default_value(Some("CURRENT_TIMESTAMP")),
        Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
    );
    let string = ColumnSchema::new("label", types::STRING, "varchar(10)");
    assert_eq!(
        string.normalize_default_value(Some("CURRENT_TIMESTAMP")),
        Some(DefaultValue::String("CURRENT_TIMESTAMP".into()))
    );
}
