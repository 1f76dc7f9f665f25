use keystone_core::{types, ColumnSchema, Params, Row, TableSchema};

use super::mysql::{parse_foreign_keys, parse_unique_indexes};
use super::{abstract_type, query_rows, split_db_type};
use crate::connection::Connection;
use crate::error::Result;

const TYPE_MAP: &[(&str, &str)] = &[
    ("float", types::FLOAT),
    ("binary_float", types::FLOAT),
    ("binary_double", types::DOUBLE),
    ("double", types::DOUBLE),
    ("char", types::CHAR),
    ("nchar", types::CHAR),
    ("varchar", types::STRING),
    ("varchar2", types::STRING),
    ("nvarchar2", types::STRING),
    ("clob", types::TEXT),
    ("nclob", types::TEXT),
    ("long", types::TEXT),
    ("blob", types::BINARY),
    ("raw", types::BINARY),
    ("long raw", types::BINARY),
    ("bfile", types::BINARY),
    ("date", types::DATE),
    ("timestamp", types::TIMESTAMP),
    ("interval", types::STRING),
    ("rowid", types::STRING),
];

pub(super) fn table_names_sql(schema: Option<&str>) -> (String, Params) {
    (
        "SELECT TABLE_NAME FROM ALL_TABLES WHERE OWNER = NVL(:schema, USER) \
         UNION ALL SELECT VIEW_NAME AS TABLE_NAME FROM ALL_VIEWS WHERE OWNER = NVL(:schema, USER) \
         ORDER BY TABLE_NAME"
            .to_string(),
        Params::new().with("schema", schema),
    )
}

/// Finds the sequence a trigger on the table feeds its key from.
pub(super) fn trigger_sequence_sql(table: &str) -> (String, Params) {
    (
        "SELECT UD.REFERENCED_NAME AS SEQUENCE_NAME FROM USER_DEPENDENCIES UD \
         JOIN USER_TRIGGERS UT ON UT.TRIGGER_NAME = UD.NAME \
         WHERE UT.TABLE_NAME = :table AND UD.TYPE = 'TRIGGER' AND UD.REFERENCED_TYPE = 'SEQUENCE'"
            .to_string(),
        Params::new().with("table", table),
    )
}

// USER_SEQUENCES does not keep the start value.
pub(super) fn sequence_info_sql(sequence: &str) -> (String, Params) {
    (
        "SELECT SEQUENCE_NAME AS name, NULL AS start_value, INCREMENT_BY AS increment, \
         MIN_VALUE AS min_value, MAX_VALUE AS max_value, CYCLE_FLAG AS cycle \
         FROM USER_SEQUENCES WHERE SEQUENCE_NAME = :name"
            .to_string(),
        Params::new().with("name", sequence),
    )
}

pub(super) async fn load_table(
    db: &Connection,
    schema_name: Option<String>,
    name: &str,
) -> Result<Option<TableSchema>> {
    let params = || {
        Params::new()
            .with("schema", schema_name.as_deref())
            .with("table", name)
    };
    let columns = query_rows(
        db,
        "SELECT A.COLUMN_NAME, A.DATA_TYPE, A.DATA_PRECISION, A.DATA_SCALE, A.DATA_LENGTH, \
         A.NULLABLE, A.DATA_DEFAULT, A.IDENTITY_COLUMN, COM.COMMENTS AS COLUMN_COMMENT \
         FROM ALL_TAB_COLUMNS A \
         LEFT JOIN ALL_COL_COMMENTS COM \
         ON A.OWNER = COM.OWNER AND A.TABLE_NAME = COM.TABLE_NAME AND A.COLUMN_NAME = COM.COLUMN_NAME \
         WHERE A.OWNER = NVL(:schema, USER) AND A.TABLE_NAME = :table ORDER BY A.COLUMN_ID",
        params(),
    )
    .await?;
    if columns.is_empty() {
        return Ok(None);
    }
    let constraints = query_rows(
        db,
        "SELECT C.CONSTRAINT_NAME AS INDEX_NAME, C.CONSTRAINT_TYPE, CC.COLUMN_NAME \
         FROM ALL_CONSTRAINTS C \
         JOIN ALL_CONS_COLUMNS CC ON CC.OWNER = C.OWNER AND CC.CONSTRAINT_NAME = C.CONSTRAINT_NAME \
         WHERE C.OWNER = NVL(:schema, USER) AND C.TABLE_NAME = :table AND C.CONSTRAINT_TYPE IN ('P', 'U') \
         ORDER BY C.CONSTRAINT_NAME, CC.POSITION",
        params(),
    )
    .await?;
    let foreign_keys = query_rows(
        db,
        "SELECT C.CONSTRAINT_NAME, CC.COLUMN_NAME, RC.TABLE_NAME AS FOREIGN_TABLE, \
         RCC.COLUMN_NAME AS FOREIGN_COLUMN, C.DELETE_RULE \
         FROM ALL_CONSTRAINTS C \
         JOIN ALL_CONS_COLUMNS CC ON CC.OWNER = C.OWNER AND CC.CONSTRAINT_NAME = C.CONSTRAINT_NAME \
         JOIN ALL_CONSTRAINTS RC ON RC.OWNER = C.R_OWNER AND RC.CONSTRAINT_NAME = C.R_CONSTRAINT_NAME \
         JOIN ALL_CONS_COLUMNS RCC ON RCC.OWNER = RC.OWNER AND RCC.CONSTRAINT_NAME = RC.CONSTRAINT_NAME \
         AND RCC.POSITION = CC.POSITION \
         WHERE C.OWNER = NVL(:schema, USER) AND C.TABLE_NAME = :table AND C.CONSTRAINT_TYPE = 'R' \
         ORDER BY C.CONSTRAINT_NAME, CC.POSITION",
        params(),
    )
    .await?;

    let mut table = TableSchema::new(schema_name, name);
    let (primary_key, unique): (Vec<Row>, Vec<Row>) = constraints
        .into_iter()
        .partition(|row| row.get_str("CONSTRAINT_TYPE") == Some("P"));
    table.primary_key = primary_key
        .iter()
        .filter_map(|row| row.get_string("COLUMN_NAME"))
        .collect();
    table.unique_constraints = parse_unique_indexes(&unique);
    table.columns = parse_columns(&columns);
    for column in &mut table.columns {
        column.is_primary_key = table.primary_key.contains(&column.name);
    }
    table.sequence_name = table.columns.iter().find_map(|c| c.sequence_name.clone());
    table.foreign_keys = parse_foreign_keys(&foreign_keys);
    Ok(Some(table))
}

/// Parses `ALL_TAB_COLUMNS` rows.
///
/// `NUMBER` with a zero scale is an integer, or a bigint past eleven
/// digits. Identity columns and `seq.nextval` defaults are auto-increment.
#[must_use]
pub fn parse_columns(rows: &[Row]) -> Vec<ColumnSchema> {
    rows.iter().map(parse_column).collect()
}

fn parse_column(row: &Row) -> ColumnSchema {
    let name = row.get_string("COLUMN_NAME").unwrap_or_default();
    let data_type = row.get_string("DATA_TYPE").unwrap_or_default();
    let precision = row.get_i64("DATA_PRECISION").and_then(|n| u32::try_from(n).ok());
    let scale = row.get_i64("DATA_SCALE").and_then(|n| u32::try_from(n).ok());
    let base = split_db_type(&data_type).base;
    let column_type = match (base.as_str(), precision, scale) {
        ("number", Some(p), Some(0) | None) if p > 11 => types::BIGINT,
        ("number", Some(_), Some(0) | None) => types::INTEGER,
        ("number", Some(_), Some(_)) => types::DECIMAL,
        ("number", None, Some(0)) => types::INTEGER,
        ("number", None, _) => types::DOUBLE,
        (base, _, _) if base.starts_with("interval") => types::STRING,
        (base, _, _) => abstract_type(TYPE_MAP, base),
    };
    let db_type = match (base.as_str(), precision, scale) {
        ("number", Some(p), Some(s)) if s > 0 => format!("NUMBER({p},{s})"),
        ("number", Some(p), _) => format!("NUMBER({p})"),
        ("varchar2" | "nvarchar2" | "char" | "nchar" | "raw", _, _) => {
            match row.get_i64("DATA_LENGTH") {
                Some(len) => format!("{data_type}({len})"),
                None => data_type.clone(),
            }
        }
        _ => data_type.clone(),
    };

    let mut column = ColumnSchema::new(name, column_type, db_type);
    column.precision = precision;
    column.scale = scale;
    column.size = precision.or_else(|| {
        row.get_i64("DATA_LENGTH")
            .and_then(|n| u32::try_from(n).ok())
            .filter(|_| column_type != types::INTEGER)
    });
    column.allow_null = row.get_str("NULLABLE") == Some("Y");
    column.comment = row.get_string("COLUMN_COMMENT");
    column.auto_increment = row.get_str("IDENTITY_COLUMN") == Some("YES");

    let raw_default = row.get_string("DATA_DEFAULT");
    match raw_default.as_deref().and_then(nextval_sequence) {
        Some(sequence) => {
            column.auto_increment = true;
            column.sequence_name = Some(sequence);
        }
        None if !column.auto_increment => {
            column.default = column.normalize_default_value(raw_default.as_deref());
        }
        None => {}
    }
    column
}

/// `"APP"."ORDER_SEQ".nextval` → `ORDER_SEQ`.
fn nextval_sequence(default: &str) -> Option<String> {
    let default = default.trim();
    let lower = default.to_ascii_lowercase();
    let end = lower.strip_suffix(".nextval").map(str::len)?;
    let qualified = &default[..end];
    let name = qualified.rsplit('.').next().unwrap_or(qualified);
    Some(name.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::DefaultValue;

    fn column(name: &str, data_type: &str, precision: Option<i64>, scale: Option<i64>) -> Row {
        Row::new()
            .with("COLUMN_NAME", name)
            .with("DATA_TYPE", data_type)
            .with("DATA_PRECISION", precision)
            .with("DATA_SCALE", scale)
            .with("DATA_LENGTH", 22)
            .with("NULLABLE", "N")
            .with("IDENTITY_COLUMN", "NO")
    }

    #[test]
    fn test_number_types() {
        let columns = parse_columns(&[
            column("ID", "NUMBER", Some(10), Some(0)),
            column("BIG", "NUMBER", Some(20), Some(0)),
            column("PRICE", "NUMBER", Some(10), Some(2)),
            column("RATIO", "NUMBER", None, None),
        ]);
        assert_eq!(columns[0].abstract_type, types::INTEGER);
        assert_eq!(columns[0].db_type, "NUMBER(10)");
        assert_eq!(columns[1].abstract_type, types::BIGINT);
        assert_eq!(columns[2].abstract_type, types::DECIMAL);
        assert_eq!(columns[2].db_type, "NUMBER(10,2)");
        assert_eq!(columns[3].abstract_type, types::DOUBLE);
    }

    #[test]
    fn test_identity_and_trigger_sequences() {
        let identity = Row::new()
            .with("COLUMN_NAME", "ID")
            .with("DATA_TYPE", "NUMBER")
            .with("DATA_PRECISION", 10)
            .with("DATA_SCALE", 0)
            .with("NULLABLE", "N")
            .with("IDENTITY_COLUMN", "YES")
            .with("DATA_DEFAULT", "\"APP\".\"ISEQ$$_1\".nextval");
        let serial = Row::new()
            .with("COLUMN_NAME", "ID")
            .with("DATA_TYPE", "NUMBER")
            .with("NULLABLE", "N")
            .with("DATA_DEFAULT", "\"ORDER_SEQ\".NEXTVAL ");
        let columns = parse_columns(&[identity, serial]);
        assert!(columns[0].auto_increment);
        assert_eq!(columns[0].sequence_name.as_deref(), Some("ISEQ$$_1"));
        assert!(columns[1].auto_increment);
        assert_eq!(columns[1].sequence_name.as_deref(), Some("ORDER_SEQ"));
        assert_eq!(columns[1].default, None);
    }

    #[test]
    fn test_string_defaults_and_lengths() {
        let row = Row::new()
            .with("COLUMN_NAME", "STATUS")
            .with("DATA_TYPE", "VARCHAR2")
            .with("DATA_LENGTH", 32)
            .with("NULLABLE", "Y")
            .with("DATA_DEFAULT", "'draft' ")
            .with("COLUMN_COMMENT", "Lifecycle state");
        let columns = parse_columns(&[row]);
        assert_eq!(columns[0].abstract_type, types::STRING);
        assert_eq!(columns[0].db_type, "VARCHAR2(32)");
        assert_eq!(columns[0].size, Some(32));
        assert!(columns[0].allow_null);
        assert_eq!(columns[0].default, Some(DefaultValue::String("draft".into())));
        assert_eq!(columns[0].comment.as_deref(), Some("Lifecycle state"));
    }

    #[test]
    fn test_timestamp_with_fraction() {
        let row = column("CREATED_AT", "TIMESTAMP(6)", None, Some(6));
        assert_eq!(parse_columns(&[row])[0].abstract_type, types::TIMESTAMP);
    }
}
