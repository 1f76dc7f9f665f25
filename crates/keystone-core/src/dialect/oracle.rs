use super::{common, BatchLayout, DialectDriver, DriverName};
use crate::column::ColumnSchema;
use crate::column_builder::ColumnFormat;
use crate::error::{Error, Result};
use crate::query_builder::{InsertValues, PreparedInsert, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::{ForeignKey, TableSchema};
use crate::tokenizer::PlaceholderStyle;

const TYPE_MAP: &[(&str, &str)] = &[
    ("pk", "NUMBER(10) GENERATED BY DEFAULT AS IDENTITY NOT NULL PRIMARY KEY"),
    ("upk", "NUMBER(10) GENERATED BY DEFAULT AS IDENTITY NOT NULL PRIMARY KEY"),
    ("bigpk", "NUMBER(20) GENERATED BY DEFAULT AS IDENTITY NOT NULL PRIMARY KEY"),
    ("ubigpk", "NUMBER(20) GENERATED BY DEFAULT AS IDENTITY NOT NULL PRIMARY KEY"),
    ("auto", "NUMBER(10) GENERATED BY DEFAULT AS IDENTITY"),
    ("bigauto", "NUMBER(20) GENERATED BY DEFAULT AS IDENTITY"),
    ("char", "CHAR(1)"),
    ("string", "VARCHAR2(255)"),
    ("text", "CLOB"),
    ("tinyint", "NUMBER(3)"),
    ("smallint", "NUMBER(5)"),
    ("integer", "NUMBER(10)"),
    ("bigint", "NUMBER(20)"),
    ("float", "NUMBER"),
    ("double", "NUMBER"),
    ("decimal", "NUMBER"),
    ("datetime", "TIMESTAMP"),
    ("timestamp", "TIMESTAMP"),
    ("time", "TIMESTAMP"),
    ("date", "DATE"),
    ("binary", "BLOB"),
    ("boolean", "NUMBER(1)"),
    ("money", "NUMBER(19,4)"),
    ("json", "CLOB"),
];

/// Oracle.
#[derive(Debug, Clone, Copy)]
pub struct OracleDriver {
    quoter: Quoter,
}

impl OracleDriver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quoter: Quoter::oracle(),
        }
    }
}

impl Default for OracleDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectDriver for OracleDriver {
    fn name(&self) -> DriverName {
        DriverName::Oci
    }

    fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::ColonNumber
    }

    fn type_map(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_MAP
    }

    fn column_format(&self) -> ColumnFormat {
        ColumnFormat {
            default: "{type}{length}{default}{notnull}{check}{append}",
            pk: "{type}{length}{check}{append}",
            numeric: "{type}{length}{default}{notnull}{check}{append}",
        }
    }

    fn default_values_sql(&self, insert: &PreparedInsert<'_>) -> String {
        let primary_key = insert.schema.map(|s| s.primary_key.as_slice()).unwrap_or_default();
        if primary_key.is_empty() {
            return format!("INSERT INTO {} VALUES (DEFAULT)", insert.table);
        }
        let defaults = vec!["DEFAULT"; primary_key.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            insert.table,
            common::quote_columns(&self.quoter, primary_key),
            defaults.join(", ")
        )
    }

    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String {
        let q = &self.quoter;
        let source = match upsert.insert.values {
            InsertValues::Row(ref placeholders) => {
                let selected: Vec<String> = placeholders
                    .iter()
                    .zip(&upsert.insert.columns)
                    .map(|(value, column)| format!("{value} AS {}", q.quote_column_name(column)))
                    .collect();
                format!(
                    "SELECT {} FROM {}",
                    selected.join(", "),
                    q.quote_table_name("DUAL")
                )
            }
            InsertValues::Select(ref select) => select.clone(),
            InsertValues::Default => return self.insert_sql(&upsert.insert),
        };
        let excluded_table = q.quote_table_name("EXCLUDED");
        let excluded = |column: &str| format!("{excluded_table}.{}", q.quote_column_name(column));
        format!(
            "MERGE INTO {} USING ({source}) {excluded_table}{}",
            upsert.insert.table,
            common::merge_tail(q, upsert, excluded)
        )
    }

    fn batch_insert_layout(&self, table: &str, columns: &str) -> BatchLayout {
        BatchLayout {
            head: "INSERT ALL ".to_string(),
            row_prefix: format!("INTO {table}{columns} VALUES "),
            separator: " ",
            tail: " SELECT 1 FROM DUAL",
        }
    }

    fn order_by_and_limit_sql(
        &self,
        order_by: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !order_by.is_empty() {
            parts.push(order_by.to_string());
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {offset} ROWS"));
        }
        if let Some(limit) = limit {
            parts.push(format!("FETCH NEXT {limit} ROWS ONLY"));
        }
        parts.join(" ")
    }

    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} MODIFY {} {column_type}",
            self.quoter.quote_table_name(table),
            self.quoter.quote_column_name(column)
        ))
    }

    fn add_foreign_key_sql(&self, table: &str, foreign_key: &ForeignKey) -> Result<String> {
        if foreign_key.on_update.is_some() {
            return Err(Error::not_supported(
                "add_foreign_key with ON UPDATE",
                self.name().as_str(),
            ));
        }
        Ok(common::add_foreign_key_sql(&self.quoter, table, foreign_key))
    }

    fn drop_index_sql(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quoter.quote_table_name(name))
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn reset_sequence_sql(&self, name: &str, value: i64) -> Result<String> {
        Ok(format!(
            "ALTER SEQUENCE {} RESTART START WITH {value}",
            self.quoter.quote_table_name(name)
        ))
    }

    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        column: &ColumnSchema,
        value: i64,
    ) -> Result<String> {
        let q = &self.quoter;
        match column.sequence_name.as_deref().or(table.sequence_name.as_deref()) {
            Some(sequence) => {
                let sequence = q.quote_table_name(sequence);
                Ok(format!(
                    "DROP SEQUENCE {sequence}; CREATE SEQUENCE {sequence} START WITH {value} INCREMENT BY 1 NOMAXVALUE NOCACHE"
                ))
            }
            None => Ok(format!(
                "ALTER TABLE {} MODIFY {} GENERATED BY DEFAULT AS IDENTITY (START WITH {value})",
                q.quote_table_name(&table.full_name),
                q.quote_column_name(&column.name)
            )),
        }
    }

    fn last_insert_id_sql(&self, sequence: Option<&str>) -> Result<String> {
        let sequence = sequence.ok_or_else(|| {
            Error::invalid_argument("Reading the last insert id on Oracle needs a sequence name.")
        })?;
        Ok(format!(
            "SELECT {}.CURRVAL FROM {}",
            self.quoter.quote_table_name(sequence),
            self.quoter.quote_table_name("DUAL")
        ))
    }
}
