use keystone_core::{
    types, ColumnSchema, ForeignKey, ForeignKeyAction, Params, Quoter, Row, TableSchema,
    UniqueConstraint,
};

use super::{abstract_type, apply_type_args, query_rows, split_db_type};
use crate::connection::Connection;
use crate::error::Result;

const TYPE_MAP: &[(&str, &str)] = &[
    ("tinyint", types::TINYINT),
    ("bit", types::INTEGER),
    ("smallint", types::SMALLINT),
    ("mediumint", types::INTEGER),
    ("int", types::INTEGER),
    ("integer", types::INTEGER),
    ("bigint", types::BIGINT),
    ("float", types::FLOAT),
    ("double", types::DOUBLE),
    ("real", types::FLOAT),
    ("decimal", types::DECIMAL),
    ("numeric", types::DECIMAL),
    ("tinytext", types::TEXT),
    ("mediumtext", types::TEXT),
    ("longtext", types::TEXT),
    ("longblob", types::BINARY),
    ("blob", types::BINARY),
    ("text", types::TEXT),
    ("varchar", types::STRING),
    ("string", types::STRING),
    ("char", types::CHAR),
    ("datetime", types::DATETIME),
    ("year", types::DATE),
    ("date", types::DATE),
    ("time", types::TIME),
    ("timestamp", types::TIMESTAMP),
    ("enum", types::STRING),
    ("set", types::STRING),
    ("binary", types::BINARY),
    ("varbinary", types::BINARY),
    ("json", types::JSON),
];

pub(super) fn table_names_sql(quoter: &Quoter, schema: Option<&str>) -> (String, Params) {
    let sql = match schema {
        Some(schema) => format!("SHOW FULL TABLES FROM {}", quoter.quote_simple_table_name(schema)),
        None => "SHOW FULL TABLES".to_string(),
    };
    (sql, Params::new())
}

pub(super) async fn load_table(
    db: &Connection,
    schema_name: Option<String>,
    name: &str,
) -> Result<Option<TableSchema>> {
    let quoter = db.quoter();
    let quoted = match schema_name {
        Some(ref schema) => format!(
            "{}.{}",
            quoter.quote_simple_table_name(schema),
            quoter.quote_simple_table_name(name)
        ),
        None => quoter.quote_simple_table_name(name),
    };
    // SHOW FULL COLUMNS fails for a missing table, so check existence first.
    let exists = query_rows(
        db,
        "SELECT 1 FROM information_schema.TABLES WHERE TABLE_SCHEMA = COALESCE(:schema, DATABASE()) AND TABLE_NAME = :table",
        table_params(schema_name.as_deref(), name),
    )
    .await?;
    if exists.is_empty() {
        return Ok(None);
    }

    let columns = query_rows(db, &format!("SHOW FULL COLUMNS FROM {quoted}"), Params::new()).await?;
    let foreign_keys = query_rows(
        db,
        "SELECT kcu.CONSTRAINT_NAME AS constraint_name, kcu.COLUMN_NAME AS column_name, \
         kcu.REFERENCED_TABLE_NAME AS foreign_table, kcu.REFERENCED_COLUMN_NAME AS foreign_column, \
         rc.UPDATE_RULE AS update_rule, rc.DELETE_RULE AS delete_rule \
         FROM information_schema.REFERENTIAL_CONSTRAINTS rc \
         JOIN information_schema.KEY_COLUMN_USAGE kcu \
         ON kcu.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA AND kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME \
         WHERE rc.CONSTRAINT_SCHEMA = COALESCE(:schema, DATABASE()) AND rc.TABLE_NAME = :table \
         ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
        table_params(schema_name.as_deref(), name),
    )
    .await?;
    let indexes = query_rows(
        db,
        "SELECT INDEX_NAME AS index_name, COLUMN_NAME AS column_name FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = COALESCE(:schema, DATABASE()) AND TABLE_NAME = :table \
         AND NON_UNIQUE = 0 AND INDEX_NAME <> 'PRIMARY' ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        table_params(schema_name.as_deref(), name),
    )
    .await?;

    let mut table = TableSchema::new(schema_name, name);
    table.columns = parse_columns(&columns);
    table.primary_key = table
        .columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect();
    table.foreign_keys = parse_foreign_keys(&foreign_keys);
    table.unique_constraints = parse_unique_indexes(&indexes);
    Ok(Some(table))
}

fn table_params(schema: Option<&str>, name: &str) -> Params {
    Params::new().with("schema", schema).with("table", name)
}

/// Parses `SHOW FULL COLUMNS` rows.
#[must_use]
pub fn parse_columns(rows: &[Row]) -> Vec<ColumnSchema> {
    rows.iter().map(parse_column).collect()
}

fn parse_column(row: &Row) -> ColumnSchema {
    let name = row.get_string("Field").unwrap_or_default();
    let db_type = row.get_string("Type").unwrap_or_default();
    let parsed = split_db_type(&db_type);
    let column_type = match (parsed.base.as_str(), parsed.args.as_slice()) {
        ("tinyint", [size]) if size == "1" => types::BOOLEAN,
        ("bit", [size]) => match size.parse::<u32>() {
            Ok(1) => types::BOOLEAN,
            Ok(n) if n > 32 => types::BIGINT,
            _ => types::INTEGER,
        },
        (base, _) => abstract_type(TYPE_MAP, base),
    };

    let mut column = ColumnSchema::new(name, column_type, db_type.clone());
    if matches!(parsed.base.as_str(), "enum" | "set") {
        column.enum_values = parsed
            .args
            .iter()
            .map(|v| v.trim_matches('\'').replace("''", "'"))
            .collect();
    } else {
        apply_type_args(&mut column, &parsed.args);
    }
    column.unsigned = parsed.rest.contains("unsigned");
    column.allow_null = row.get_str("Null") == Some("YES");
    column.is_primary_key = row
        .get_str("Key")
        .is_some_and(|key| key.contains("PRI"));
    column.auto_increment = row
        .get_str("Extra")
        .is_some_and(|extra| extra.to_ascii_lowercase().contains("auto_increment"));
    column.comment = row.get_string("Comment").filter(|c| !c.is_empty());
    column.default = column.normalize_default_value(row.get_string("Default").as_deref());
    column
}

/// Groups referential constraint rows by constraint name.
pub(super) fn parse_foreign_keys(rows: &[Row]) -> Vec<ForeignKey> {
    let mut keys: Vec<ForeignKey> = Vec::new();
    for row in rows {
        let name = row.get_string("constraint_name");
        let column = row.get_string("column_name").unwrap_or_default();
        let foreign_column = row.get_string("foreign_column").unwrap_or_default();
        if let Some(key) = keys.iter_mut().find(|k| k.name == name) {
            if !key.columns.contains(&column) {
                key.columns.push(column);
            }
            if !key.foreign_columns.contains(&foreign_column) {
                key.foreign_columns.push(foreign_column);
            }
            continue;
        }
        let mut key = ForeignKey::new(
            name.as_deref(),
            [column],
            row.get_string("foreign_table").unwrap_or_default(),
            [foreign_column],
        );
        key.on_update = row.get_str("update_rule").and_then(ForeignKeyAction::parse);
        key.on_delete = row.get_str("delete_rule").and_then(ForeignKeyAction::parse);
        keys.push(key);
    }
    keys
}

/// Groups `(index_name, column_name)` rows into unique constraints.
pub(super) fn parse_unique_indexes(rows: &[Row]) -> Vec<UniqueConstraint> {
    let mut constraints: Vec<UniqueConstraint> = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.get_string("index_name"), row.get_string("column_name"))
        else {
            continue;
        };
        match constraints.iter_mut().find(|c| c.name == name) {
            Some(constraint) => constraint.columns.push(column),
            None => constraints.push(UniqueConstraint {
                name,
                columns: vec![column],
            }),
        }
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::DefaultValue;

    fn show_column(field: &str, db_type: &str, null: &str, key: &str, default: Option<&str>, extra: &str) -> Row {
        Row::new()
            .with("Field", field)
            .with("Type", db_type)
            .with("Collation", None::<String>)
            .with("Null", null)
            .with("Key", key)
            .with("Default", default)
            .with("Extra", extra)
            .with("Privileges", "select,insert,update,references")
            .with("Comment", "")
    }

    #[test]
    fn test_parse_show_full_columns() {
        let rows = [
            show_column("id", "int(11) unsigned", "NO", "PRI", None, "auto_increment"),
            show_column("active", "tinyint(1)", "NO", "", Some("1"), ""),
            show_column("status", "enum('new','it''s done')", "YES", "", Some("new"), ""),
            show_column("price", "decimal(10,2)", "YES", "", Some("0.00"), ""),
            show_column("updated_at", "timestamp", "NO", "", Some("CURRENT_TIMESTAMP"), "DEFAULT_GENERATED on update CURRENT_TIMESTAMP"),
            show_column("flags", "bit(64)", "YES", "", None, ""),
        ];
        let columns = parse_columns(&rows);

        assert_eq!(columns[0].abstract_type, types::INTEGER);
        assert!(columns[0].unsigned);
        assert!(columns[0].auto_increment);
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].allow_null);
        assert_eq!(columns[0].size, Some(11));

        assert_eq!(columns[1].abstract_type, types::BOOLEAN);
        assert_eq!(columns[1].default, Some(DefaultValue::Boolean(true)));

        assert_eq!(columns[2].enum_values, vec!["new", "it's done"]);
        assert_eq!(columns[2].default, Some(DefaultValue::String("new".into())));

        assert_eq!(columns[3].abstract_type, types::DECIMAL);
        assert_eq!((columns[3].precision, columns[3].scale), (Some(10), Some(2)));
        assert_eq!(columns[3].default, Some(DefaultValue::String("0.00".into())));

        assert_eq!(
            columns[4].default,
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(columns[5].abstract_type, types::BIGINT);
    }

    #[test]
    fn test_parse_foreign_keys_and_unique_indexes() {
        let fk = |column: &str, foreign_column: &str| {
            Row::new()
                .with("constraint_name", "fk_message_source")
                .with("column_name", column)
                .with("foreign_table", "source_message")
                .with("foreign_column", foreign_column)
                .with("update_rule", "RESTRICT")
                .with("delete_rule", "CASCADE")
        };
        let keys = parse_foreign_keys(&[fk("id", "id")]);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name.as_deref(), Some("fk_message_source"));
        assert_eq!(keys[0].on_update, Some(ForeignKeyAction::Restrict));
        assert_eq!(keys[0].on_delete, Some(ForeignKeyAction::Cascade));

        let index = |name: &str, column: &str| {
            Row::new().with("index_name", name).with("column_name", column)
        };
        let uniques = parse_unique_indexes(&[
            index("uq_email", "email"),
            index("uq_name", "first"),
            index("uq_name", "last"),
        ]);
        assert_eq!(uniques.len(), 2);
        assert_eq!(uniques[1].columns, vec!["first", "last"]);
    }
}
