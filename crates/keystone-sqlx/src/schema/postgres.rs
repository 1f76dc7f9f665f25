use keystone_core::{types, ColumnSchema, DefaultValue, Params, Row, TableSchema};

use super::mysql::{parse_foreign_keys, parse_unique_indexes};
use super::{abstract_type, query_rows};
use crate::connection::Connection;
use crate::error::Result;

const DEFAULT_SCHEMA: &str = "public";

const TYPE_MAP: &[(&str, &str)] = &[
    ("bit", types::INTEGER),
    ("bit varying", types::INTEGER),
    ("varbit", types::INTEGER),
    ("bool", types::BOOLEAN),
    ("boolean", types::BOOLEAN),
    ("box", types::STRING),
    ("circle", types::STRING),
    ("point", types::STRING),
    ("line", types::STRING),
    ("lseg", types::STRING),
    ("polygon", types::STRING),
    ("path", types::STRING),
    ("character", types::CHAR),
    ("char", types::CHAR),
    ("bpchar", types::CHAR),
    ("character varying", types::STRING),
    ("varchar", types::STRING),
    ("text", types::TEXT),
    ("bytea", types::BINARY),
    ("cidr", types::STRING),
    ("inet", types::STRING),
    ("macaddr", types::STRING),
    ("real", types::FLOAT),
    ("float4", types::FLOAT),
    ("double precision", types::DOUBLE),
    ("float8", types::DOUBLE),
    ("decimal", types::DECIMAL),
    ("numeric", types::DECIMAL),
    ("money", types::MONEY),
    ("smallint", types::SMALLINT),
    ("int2", types::SMALLINT),
    ("int4", types::INTEGER),
    ("int", types::INTEGER),
    ("integer", types::INTEGER),
    ("bigint", types::BIGINT),
    ("int8", types::BIGINT),
    ("oid", types::BIGINT),
    ("smallserial", types::SMALLINT),
    ("serial2", types::SMALLINT),
    ("serial4", types::INTEGER),
    ("serial", types::INTEGER),
    ("bigserial", types::BIGINT),
    ("serial8", types::BIGINT),
    ("date", types::DATE),
    ("time", types::TIME),
    ("timetz", types::TIME),
    ("timestamp", types::TIMESTAMP),
    ("timestamptz", types::TIMESTAMP),
    ("interval", types::STRING),
    ("uuid", types::STRING),
    ("json", types::JSON),
    ("jsonb", types::JSON),
    ("xml", types::STRING),
];

pub(super) fn table_names_sql(schema: Option<&str>) -> (String, Params) {
    (
        "SELECT table_name FROM information_schema.tables WHERE table_schema = :schema \
         AND table_type IN ('BASE TABLE', 'VIEW') ORDER BY table_name"
            .to_string(),
        Params::new().with("schema", schema.unwrap_or(DEFAULT_SCHEMA)),
    )
}

pub(super) fn sequence_info_sql(sequence: &str) -> (String, Params) {
    let (schema, name) = sequence.split_once('.').unwrap_or((DEFAULT_SCHEMA, sequence));
    (
        "SELECT sequencename AS name, start_value, increment_by AS increment, min_value, \
         max_value, cycle FROM pg_sequences WHERE schemaname = :schema AND sequencename = :name"
            .to_string(),
        Params::new().with("schema", schema).with("name", name),
    )
}

pub(super) async fn load_table(
    db: &Connection,
    schema_name: Option<String>,
    name: &str,
) -> Result<Option<TableSchema>> {
    let params = || {
        Params::new()
            .with("schema", schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA))
            .with("table", name)
    };
    let columns = query_rows(
        db,
        "SELECT c.column_name, c.data_type, c.udt_name, c.is_nullable, c.column_default, \
         c.character_maximum_length, c.numeric_precision, c.numeric_scale, c.is_identity, \
         pg_get_serial_sequence(quote_ident(c.table_schema) || '.' || quote_ident(c.table_name), c.column_name) AS sequence_name, \
         col_description((quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass, c.ordinal_position::int) AS column_comment \
         FROM information_schema.columns c \
         WHERE c.table_schema = :schema AND c.table_name = :table ORDER BY c.ordinal_position",
        params(),
    )
    .await?;
    if columns.is_empty() {
        return Ok(None);
    }
    let constraints = query_rows(
        db,
        "SELECT tc.constraint_name AS index_name, tc.constraint_type, kcu.column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
         ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
         AND kcu.table_name = tc.table_name \
         WHERE tc.table_schema = :schema AND tc.table_name = :table \
         AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
        params(),
    )
    .await?;
    let foreign_keys = query_rows(
        db,
        "SELECT tc.constraint_name, kcu.column_name, ccu.table_name AS foreign_table, \
         ccu.column_name AS foreign_column, rc.update_rule, rc.delete_rule \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
         ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
         JOIN information_schema.constraint_column_usage ccu \
         ON ccu.constraint_schema = tc.constraint_schema AND ccu.constraint_name = tc.constraint_name \
         JOIN information_schema.referential_constraints rc \
         ON rc.constraint_schema = tc.constraint_schema AND rc.constraint_name = tc.constraint_name \
         WHERE tc.table_schema = :schema AND tc.table_name = :table AND tc.constraint_type = 'FOREIGN KEY' \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
        params(),
    )
    .await?;

    let mut table = TableSchema::new(schema_name, name);
    let (primary_key, unique): (Vec<&Row>, Vec<&Row>) = constraints
        .iter()
        .partition(|row| row.get_str("constraint_type") == Some("PRIMARY KEY"));
    table.primary_key = primary_key
        .iter()
        .filter_map(|row| row.get_string("column_name"))
        .collect();
    let unique: Vec<Row> = unique.into_iter().cloned().collect();
    table.unique_constraints = parse_unique_indexes(&unique);
    table.columns = parse_columns(&columns);
    for column in &mut table.columns {
        column.is_primary_key = table.primary_key.contains(&column.name);
    }
    table.sequence_name = table
        .columns
        .iter()
        .find(|c| c.auto_increment)
        .and_then(|c| c.sequence_name.clone());
    table.foreign_keys = parse_foreign_keys(&foreign_keys);
    Ok(Some(table))
}

/// Parses `information_schema.columns` rows.
///
/// `nextval(...)` defaults and identity columns are auto-increment; the
/// backing sequence comes from the `sequence_name` column or the default.
#[must_use]
pub fn parse_columns(rows: &[Row]) -> Vec<ColumnSchema> {
    rows.iter().map(parse_column).collect()
}

fn parse_column(row: &Row) -> ColumnSchema {
    let name = row.get_string("column_name").unwrap_or_default();
    let udt_name = row.get_string("udt_name").unwrap_or_default();
    let data_type = row.get_string("data_type").unwrap_or_default();
    let column_type = if data_type == "ARRAY" {
        types::STRING
    } else {
        abstract_type(TYPE_MAP, &udt_name.to_ascii_lowercase())
    };
    let mut column = ColumnSchema::new(name, column_type, udt_name);

    column.size = row
        .get_i64("character_maximum_length")
        .or_else(|| row.get_i64("numeric_precision"))
        .and_then(|n| u32::try_from(n).ok());
    column.precision = row.get_i64("numeric_precision").and_then(|n| u32::try_from(n).ok());
    column.scale = row.get_i64("numeric_scale").and_then(|n| u32::try_from(n).ok());
    column.allow_null = row.get_str("is_nullable") == Some("YES");
    column.comment = row.get_string("column_comment");

    let raw_default = row.get_string("column_default");
    let serial_sequence = raw_default.as_deref().and_then(nextval_sequence);
    let identity = row.get_str("is_identity") == Some("YES");
    if serial_sequence.is_some() || identity {
        column.auto_increment = true;
        column.sequence_name = row.get_string("sequence_name").or(serial_sequence);
    } else {
        column.default = normalize_default(&column, raw_default.as_deref());
    }
    column
}

/// `nextval('seq'::regclass)` → `seq`.
fn nextval_sequence(default: &str) -> Option<String> {
    let inner = default.strip_prefix("nextval(")?;
    let start = inner.find('\'')? + 1;
    let end = start + inner[start..].find('\'')?;
    Some(inner[start..end].replace('"', ""))
}

/// Drops the `::type` cast PostgreSQL appends to literal defaults.
fn normalize_default(column: &ColumnSchema, raw: Option<&str>) -> Option<DefaultValue> {
    let raw = raw?.trim();
    let value = match raw.rfind("::") {
        Some(cast) if !raw[cast..].contains('\'') => raw[..cast].trim(),
        _ => raw,
    };
    let value = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')).unwrap_or(value);
    column.normalize_default_value(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, udt: &str, default: Option<&str>) -> Row {
        identity_column(name, udt, default, false, None)
    }

    fn identity_column(
        name: &str,
        udt: &str,
        default: Option<&str>,
        identity: bool,
        sequence: Option<&str>,
    ) -> Row {
        Row::new()
            .with("column_name", name)
            .with("data_type", "USER-DEFINED")
            .with("udt_name", udt)
            .with("is_nullable", "YES")
            .with("column_default", default)
            .with("character_maximum_length", None::<i64>)
            .with("numeric_precision", None::<i64>)
            .with("numeric_scale", None::<i64>)
            .with("is_identity", if identity { "YES" } else { "NO" })
            .with("sequence_name", sequence)
            .with("column_comment", None::<String>)
    }

    #[test]
    fn test_serial_column_records_its_sequence() {
        let columns = parse_columns(&[column(
            "id",
            "int4",
            Some("nextval('\"order_id_seq\"'::regclass)"),
        )]);
        assert_eq!(columns[0].abstract_type, types::INTEGER);
        assert!(columns[0].auto_increment);
        assert_eq!(columns[0].sequence_name.as_deref(), Some("order_id_seq"));
        assert_eq!(columns[0].default, None);
    }

    #[test]
    fn test_identity_column_uses_serial_sequence_lookup() {
        let row = identity_column("id", "int8", None, true, Some("public.customer_id_seq"));
        let parsed = parse_columns(&[row]);
        assert!(parsed[0].auto_increment);
        assert_eq!(parsed[0].abstract_type, types::BIGINT);
        assert_eq!(
            parsed[0].sequence_name.as_deref(),
            Some("public.customer_id_seq")
        );
    }

    #[test]
    fn test_defaults_lose_their_cast() {
        let columns = parse_columns(&[
            column("name", "varchar", Some("'anonymous'::character varying")),
            column("active", "bool", Some("true")),
            column("created_at", "timestamp", Some("CURRENT_TIMESTAMP")),
            column("score", "int4", Some("'-1'::integer")),
        ]);
        assert_eq!(columns[0].default, Some(DefaultValue::String("anonymous".into())));
        assert_eq!(columns[1].abstract_type, types::BOOLEAN);
        assert_eq!(columns[1].default, Some(DefaultValue::Boolean(true)));
        assert_eq!(
            columns[2].default,
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(columns[3].default, Some(DefaultValue::Integer(-1)));
    }

    #[test]
    fn test_array_columns_are_strings() {
        let array = Row::new()
            .with("column_name", "tags")
            .with("data_type", "ARRAY")
            .with("udt_name", "_text")
            .with("is_nullable", "NO");
        let parsed = parse_columns(&[array]);
        assert_eq!(parsed[0].abstract_type, types::STRING);
        assert!(!parsed[0].allow_null);
    }

    #[test]
    fn test_nextval_sequence() {
        assert_eq!(nextval_sequence("nextval('seq'::regclass)").as_deref(), Some("seq"));
        assert_eq!(nextval_sequence("0"), None);
    }
}
