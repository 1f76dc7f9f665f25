use keystone_core::{
    types, ColumnSchema, ForeignKey, ForeignKeyAction, Params, Row, TableSchema, UniqueConstraint,
};

use super::{abstract_type, apply_type_args, query_rows, split_db_type};
use crate::connection::Connection;
use crate::error::Result;

const TYPE_MAP: &[(&str, &str)] = &[
    ("tinyint", types::TINYINT),
    ("bit", types::SMALLINT),
    ("boolean", types::BOOLEAN),
    ("bool", types::BOOLEAN),
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
    ("text", types::TEXT),
    ("varchar", types::STRING),
    ("string", types::STRING),
    ("char", types::CHAR),
    ("blob", types::BINARY),
    ("datetime", types::DATETIME),
    ("year", types::DATE),
    ("date", types::DATE),
    ("time", types::TIME),
    ("timestamp", types::TIMESTAMP),
    ("enum", types::STRING),
    ("json", types::JSON),
];

pub(super) fn table_names_sql() -> (String, Params) {
    (
        "SELECT DISTINCT tbl_name FROM sqlite_master WHERE tbl_name<>'sqlite_sequence' ORDER BY tbl_name"
            .to_string(),
        Params::new(),
    )
}

pub(super) async fn load_table(
    db: &Connection,
    schema_name: Option<String>,
    name: &str,
) -> Result<Option<TableSchema>> {
    let quoted = db.quoter().quote_simple_table_name(name);
    let columns = query_rows(db, &format!("PRAGMA TABLE_INFO({quoted})"), Params::new()).await?;
    if columns.is_empty() {
        return Ok(None);
    }
    let foreign_keys =
        query_rows(db, &format!("PRAGMA FOREIGN_KEY_LIST({quoted})"), Params::new()).await?;

    let mut unique_constraints = Vec::new();
    for index in query_rows(db, &format!("PRAGMA INDEX_LIST({quoted})"), Params::new()).await? {
        let Some(index_name) = index.get_string("name") else {
            continue;
        };
        if !index.get_bool("unique").unwrap_or(false) || index.get_str("origin") == Some("pk") {
            continue;
        }
        let sql = format!(
            "PRAGMA INDEX_INFO({})",
            db.quoter().quote_simple_column_name(&index_name)
        );
        let index_columns = query_rows(db, &sql, Params::new()).await?;
        unique_constraints.push(parse_index(&index_name, &index_columns));
    }

    let mut table = TableSchema::new(schema_name, name);
    table.columns = parse_columns(&columns);
    table.primary_key = primary_key(&columns);
    table.foreign_keys = parse_foreign_keys(&foreign_keys);
    table.unique_constraints = unique_constraints;
    Ok(Some(table))
}

/// Parses `PRAGMA TABLE_INFO` rows.
///
/// A lone `integer` primary key aliases the rowid and is auto-increment.
#[must_use]
pub fn parse_columns(rows: &[Row]) -> Vec<ColumnSchema> {
    let primary_key = primary_key(rows);
    rows.iter()
        .map(|row| {
            let name = row.get_string("name").unwrap_or_default();
            let db_type = row.get_string("type").unwrap_or_default().to_ascii_lowercase();
            let parsed = split_db_type(&db_type);
            let mut column_type = abstract_type(TYPE_MAP, &parsed.base);
            if matches!(parsed.base.as_str(), "bit" | "tinyint")
                && parsed.args.first().map(String::as_str) == Some("1")
            {
                column_type = types::BOOLEAN;
            }
            let mut column = ColumnSchema::new(name, column_type, db_type.clone());
            apply_type_args(&mut column, &parsed.args);
            column.unsigned = parsed.rest.contains("unsigned");
            column.allow_null = !row.get_bool("notnull").unwrap_or(false);
            column.is_primary_key = row.get_i64("pk").unwrap_or(0) > 0;
            column.auto_increment = column.is_primary_key
                && primary_key.len() == 1
                && db_type.starts_with("int");
            column.default = column.normalize_default_value(row.get_string("dflt_value").as_deref());
            column
        })
        .collect()
}

/// Primary key columns ordered by their key position.
fn primary_key(rows: &[Row]) -> Vec<String> {
    let mut keys: Vec<(i64, String)> = rows
        .iter()
        .filter_map(|row| {
            let position = row.get_i64("pk").filter(|p| *p > 0)?;
            Some((position, row.get_string("name")?))
        })
        .collect();
    keys.sort_by_key(|(position, _)| *position);
    keys.into_iter().map(|(_, name)| name).collect()
}

/// Parses `PRAGMA FOREIGN_KEY_LIST` rows; rows sharing an `id` form one key.
#[must_use]
pub fn parse_foreign_keys(rows: &[Row]) -> Vec<ForeignKey> {
    let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
    for row in rows {
        let id = row.get_i64("id").unwrap_or(0);
        let from = row.get_string("from").unwrap_or_default();
        let to = row.get_string("to").unwrap_or_default();
        if let Some((_, key)) = keys.iter_mut().find(|(key_id, _)| *key_id == id) {
            key.columns.push(from);
            key.foreign_columns.push(to);
            continue;
        }
        let mut key = ForeignKey::new(
            None,
            [from],
            row.get_string("table").unwrap_or_default(),
            [to],
        );
        key.on_delete = row.get_str("on_delete").and_then(ForeignKeyAction::parse);
        key.on_update = row.get_str("on_update").and_then(ForeignKeyAction::parse);
        keys.push((id, key));
    }
    keys.into_iter().map(|(_, key)| key).collect()
}

fn parse_index(name: &str, rows: &[Row]) -> UniqueConstraint {
    let mut columns: Vec<(i64, String)> = rows
        .iter()
        .filter_map(|row| Some((row.get_i64("seqno")?, row.get_string("name")?)))
        .collect();
    columns.sort_by_key(|(seqno, _)| *seqno);
    UniqueConstraint {
        name: name.to_string(),
        columns: columns.into_iter().map(|(_, column)| column).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::DefaultValue;

    fn info(cid: i64, name: &str, db_type: &str, notnull: bool, default: Option<&str>, pk: i64) -> Row {
        Row::new()
            .with("cid", cid)
            .with("name", name)
            .with("type", db_type)
            .with("notnull", i64::from(notnull))
            .with("dflt_value", default)
            .with("pk", pk)
    }

    #[test]
    fn test_single_integer_key_is_auto_increment() {
        let rows = [
            info(0, "id", "INTEGER", true, None, 1),
            info(1, "email", "varchar(128)", true, None, 0),
            info(2, "created_at", "timestamp", false, Some("CURRENT_TIMESTAMP"), 0),
            info(3, "status", "tinyint(1)", false, Some("'1'"), 0),
        ];
        let columns = parse_columns(&rows);
        assert!(columns[0].auto_increment);
        assert!(columns[0].is_primary_key);
        assert_eq!(columns[0].abstract_type, types::INTEGER);
        assert_eq!(columns[1].abstract_type, types::STRING);
        assert_eq!(columns[1].size, Some(128));
        assert!(!columns[1].allow_null);
        assert_eq!(
            columns[2].default,
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(columns[3].abstract_type, types::BOOLEAN);
        assert_eq!(columns[3].default, Some(DefaultValue::Boolean(true)));
    }

    #[test]
    fn test_only_single_digit_tinyint_is_boolean() {
        let rows = [
            info(0, "flag", "bit(1)", false, None, 0),
            info(1, "level", "tinyint(3)", false, Some("'7'"), 0),
            info(2, "plain", "tinyint", false, None, 0),
        ];
        let columns = parse_columns(&rows);
        assert_eq!(columns[0].abstract_type, types::BOOLEAN);
        assert_ne!(columns[1].abstract_type, types::BOOLEAN);
        assert_eq!(columns[1].default, Some(DefaultValue::Integer(7)));
        assert_ne!(columns[2].abstract_type, types::BOOLEAN);
    }

    #[test]
    fn test_composite_key_is_not_auto_increment() {
        let rows = [
            info(0, "language", "varchar(16)", true, None, 2),
            info(1, "id", "integer", true, None, 1),
        ];
        let columns = parse_columns(&rows);
        assert!(columns.iter().all(|c| !c.auto_increment));
        assert_eq!(primary_key(&rows), vec!["id", "language"]);
    }

    #[test]
    fn test_foreign_keys_group_by_id() {
        let fk = |id: i64, seq: i64, from: &str, to: &str| {
            Row::new()
                .with("id", id)
                .with("seq", seq)
                .with("table", "order")
                .with("from", from)
                .with("to", to)
                .with("on_update", "NO ACTION")
                .with("on_delete", "CASCADE")
        };
        let keys = parse_foreign_keys(&[fk(0, 0, "order_id", "id"), fk(0, 1, "order_lang", "lang")]);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].columns, vec!["order_id", "order_lang"]);
        assert_eq!(keys[0].foreign_columns, vec!["id", "lang"]);
        assert_eq!(keys[0].on_delete, Some(ForeignKeyAction::Cascade));
    }
}
