use keystone_core::{types, ColumnSchema, Params, Row, TableSchema};

use super::mysql::{parse_foreign_keys, parse_unique_indexes};
use super::{abstract_type, query_rows, strip_parens};
use crate::connection::Connection;
use crate::error::Result;

const DEFAULT_SCHEMA: &str = "dbo";

const TYPE_MAP: &[(&str, &str)] = &[
    ("bigint", types::BIGINT),
    ("numeric", types::DECIMAL),
    ("bit", types::SMALLINT),
    ("smallint", types::SMALLINT),
    ("decimal", types::DECIMAL),
    ("smallmoney", types::MONEY),
    ("int", types::INTEGER),
    ("tinyint", types::TINYINT),
    ("money", types::MONEY),
    ("float", types::FLOAT),
    ("double", types::DOUBLE),
    ("real", types::FLOAT),
    ("date", types::DATE),
    ("datetimeoffset", types::DATETIME),
    ("datetime2", types::DATETIME),
    ("smalldatetime", types::DATETIME),
    ("datetime", types::DATETIME),
    ("time", types::TIME),
    ("char", types::CHAR),
    ("varchar", types::STRING),
    ("text", types::TEXT),
    ("nchar", types::CHAR),
    ("nvarchar", types::STRING),
    ("ntext", types::TEXT),
    ("binary", types::BINARY),
    ("varbinary", types::BINARY),
    ("image", types::BINARY),
    ("timestamp", types::TIMESTAMP),
    ("hierarchyid", types::STRING),
    ("uniqueidentifier", types::STRING),
    ("sql_variant", types::STRING),
    ("xml", types::STRING),
    ("table", types::STRING),
];

pub(super) fn table_names_sql(schema: Option<&str>) -> (String, Params) {
    (
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = :schema \
         AND TABLE_TYPE IN ('BASE TABLE', 'VIEW') ORDER BY TABLE_NAME"
            .to_string(),
        Params::new().with("schema", schema.unwrap_or(DEFAULT_SCHEMA)),
    )
}

pub(super) fn sequence_info_sql(sequence: &str) -> (String, Params) {
    let (schema, name) = sequence.split_once('.').unwrap_or((DEFAULT_SCHEMA, sequence));
    (
        "SELECT s.name AS name, CAST(s.start_value AS BIGINT) AS start_value, \
         CAST(s.increment AS BIGINT) AS increment, CAST(s.minimum_value AS BIGINT) AS min_value, \
         CAST(s.maximum_value AS BIGINT) AS max_value, s.is_cycling AS cycle \
         FROM sys.sequences s JOIN sys.schemas sc ON sc.schema_id = s.schema_id \
         WHERE sc.name = :schema AND s.name = :name"
            .to_string(),
        Params::new().with("schema", schema).with("name", name),
    )
}

pub(super) async fn load_table(
    db: &Connection,
    schema_name: Option<String>,
    name: &str,
) -> Result<Option<TableSchema>> {
    let schema = schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA);
    let params = || Params::new().with("schema", schema).with("table", name);
    let columns = query_rows(
        db,
        "SELECT c.COLUMN_NAME AS column_name, c.DATA_TYPE AS data_type, c.IS_NULLABLE AS is_nullable, \
         c.COLUMN_DEFAULT AS column_default, c.CHARACTER_MAXIMUM_LENGTH AS character_maximum_length, \
         c.NUMERIC_PRECISION AS numeric_precision, c.NUMERIC_SCALE AS numeric_scale, \
         COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity') AS is_identity, \
         CONVERT(VARCHAR, ep.value) AS comment \
         FROM INFORMATION_SCHEMA.COLUMNS c \
         LEFT JOIN sys.extended_properties ep \
         ON ep.major_id = OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME) \
         AND ep.minor_id = COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'ColumnId') \
         AND ep.name = 'MS_Description' \
         WHERE c.TABLE_SCHEMA = :schema AND c.TABLE_NAME = :table ORDER BY c.ORDINAL_POSITION",
        params(),
    )
    .await?;
    if columns.is_empty() {
        return Ok(None);
    }
    let constraints = query_rows(
        db,
        "SELECT tc.CONSTRAINT_NAME AS index_name, tc.CONSTRAINT_TYPE AS constraint_type, \
         kcu.COLUMN_NAME AS column_name \
         FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
         JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
         ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
         WHERE tc.TABLE_SCHEMA = :schema AND tc.TABLE_NAME = :table \
         AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE') \
         ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
        params(),
    )
    .await?;
    let foreign_keys = query_rows(
        db,
        "SELECT fk.name AS constraint_name, cp.name AS column_name, tr.name AS foreign_table, \
         cr.name AS foreign_column, fk.update_referential_action_desc AS update_rule, \
         fk.delete_referential_action_desc AS delete_rule \
         FROM sys.foreign_keys fk \
         JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
         JOIN sys.tables tp ON tp.object_id = fk.parent_object_id \
         JOIN sys.schemas sp ON sp.schema_id = tp.schema_id \
         JOIN sys.columns cp ON cp.object_id = fkc.parent_object_id AND cp.column_id = fkc.parent_column_id \
         JOIN sys.tables tr ON tr.object_id = fk.referenced_object_id \
         JOIN sys.columns cr ON cr.object_id = fkc.referenced_object_id AND cr.column_id = fkc.referenced_column_id \
         WHERE sp.name = :schema AND tp.name = :table \
         ORDER BY fk.name, fkc.constraint_column_id",
        params(),
    )
    .await?;

    let mut table = TableSchema::new(schema_name, name);
    let (primary_key, unique): (Vec<Row>, Vec<Row>) = constraints
        .into_iter()
        .partition(|row| row.get_str("constraint_type") == Some("PRIMARY KEY"));
    table.primary_key = primary_key
        .iter()
        .filter_map(|row| row.get_string("column_name"))
        .collect();
    table.unique_constraints = parse_unique_indexes(&unique);
    table.columns = parse_columns(&columns);
    for column in &mut table.columns {
        column.is_primary_key = table.primary_key.contains(&column.name);
    }
    table.foreign_keys = parse_foreign_keys(&foreign_keys);
    Ok(Some(table))
}

/// Parses `INFORMATION_SCHEMA.COLUMNS` rows joined with the identity flag.
#[must_use]
pub fn parse_columns(rows: &[Row]) -> Vec<ColumnSchema> {
    rows.iter().map(parse_column).collect()
}

fn parse_column(row: &Row) -> ColumnSchema {
    let name = row.get_string("column_name").unwrap_or_default();
    let data_type = row.get_string("data_type").unwrap_or_default();
    let base = data_type.to_ascii_lowercase();
    let size = row
        .get_i64("character_maximum_length")
        .or_else(|| row.get_i64("numeric_precision"));
    let db_type = match (base.as_str(), size) {
        ("varchar" | "nvarchar" | "varbinary", Some(-1)) => format!("{data_type}(max)"),
        ("char" | "varchar" | "nchar" | "nvarchar" | "binary" | "varbinary", Some(n)) => {
            format!("{data_type}({n})")
        }
        _ => data_type.clone(),
    };
    let mut column = ColumnSchema::new(name, abstract_type(TYPE_MAP, &base), db_type);
    column.size = size.and_then(|n| u32::try_from(n).ok());
    column.precision = row.get_i64("numeric_precision").and_then(|n| u32::try_from(n).ok());
    column.scale = row.get_i64("numeric_scale").and_then(|n| u32::try_from(n).ok());
    column.allow_null = row.get_str("is_nullable") == Some("YES");
    column.auto_increment = row.get_i64("is_identity") == Some(1);
    column.comment = row.get_string("comment");
    if !column.auto_increment {
        let raw = row.get_string("column_default");
        let raw = raw.as_deref().map(strip_parens).map(|value| {
            // N'...' unicode literals
            value.strip_prefix('N').filter(|v| v.starts_with('\'')).unwrap_or(value)
        });
        column.default = column.normalize_default_value(raw);
    }
    column
}
