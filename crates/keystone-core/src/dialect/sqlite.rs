use super::{common, DialectDriver, DriverName};
use crate::column::ColumnSchema;
use crate::column_builder::ColumnFormat;
use crate::error::{Error, Result};
use crate::query_builder::{InsertValues, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::{ForeignKey, TableSchema};

const TYPE_MAP: &[(&str, &str)] = &[
    ("pk", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("upk", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("bigpk", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("ubigpk", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("auto", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("bigauto", "integer PRIMARY KEY AUTOINCREMENT NOT NULL"),
    ("char", "char(1)"),
    ("string", "varchar(255)"),
    ("text", "text"),
    ("tinyint", "tinyint"),
    ("smallint", "smallint"),
    ("integer", "integer"),
    ("bigint", "bigint"),
    ("float", "float"),
    ("double", "double"),
    ("decimal", "decimal(10,0)"),
    ("datetime", "datetime"),
    ("timestamp", "timestamp"),
    ("time", "time"),
    ("date", "date"),
    ("binary", "blob"),
    ("boolean", "boolean"),
    ("money", "decimal(19,4)"),
    ("json", "json"),
];

/// SQLite.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDriver {
    quoter: Quoter,
}

impl SqliteDriver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quoter: Quoter::sqlite(),
        }
    }

    fn not_supported(&self, operation: &str) -> Error {
        Error::not_supported(operation, self.name().as_str())
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectDriver for SqliteDriver {
    fn name(&self) -> DriverName {
        DriverName::Sqlite
    }

    fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    fn type_map(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_MAP
    }

    fn column_format(&self) -> ColumnFormat {
        ColumnFormat {
            default: "{type}{length}{notnull}{unique}{check}{default}{append}",
            pk: "{type}{check}{append}",
            numeric: "{type}{length}{unsigned}{notnull}{unique}{check}{default}{append}",
        }
    }

    fn supports_unsigned(&self) -> bool {
        true
    }

    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String {
        let q = &self.quoter;
        let insert = common::insert_sql(q, &upsert.insert, None);
        let insert_or_ignore = insert.replacen("INSERT INTO", "INSERT OR IGNORE INTO", 1);
        let Some(updates) = upsert.updates() else {
            return insert_or_ignore;
        };

        let excluded_table = q.quote_table_name("EXCLUDED");
        let excluded =
            |column: &str| format!("(SELECT {} FROM {excluded_table})", q.quote_column_name(column));
        let source = match upsert.insert.values {
            InsertValues::Row(ref placeholders) => format!("VALUES ({})", placeholders.join(", ")),
            InsertValues::Select(ref select) => select.clone(),
            InsertValues::Default => return insert_or_ignore,
        };
        format!(
            "WITH {excluded_table}{} AS ({source}) UPDATE {} SET {} WHERE {}; {insert_or_ignore}",
            common::column_list(q, &upsert.insert.columns),
            upsert.insert.table,
            common::update_assignments(q, updates, excluded),
            common::conflict_match(q, upsert, excluded),
        )
    }

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quoter.quote_table_name(table))
    }

    fn add_column_sql(&self, table: &str, column: &str, column_type: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {column_type}",
            self.quoter.quote_table_name(table),
            self.quoter.quote_column_name(column)
        )
    }

    fn alter_column_sql(&self, _table: &str, _column: &str, _column_type: &str) -> Result<String> {
        Err(self.not_supported("alter_column"))
    }

    fn add_primary_key_sql(&self, _name: &str, _table: &str, _columns: &[String]) -> Result<String> {
        Err(self.not_supported("add_primary_key"))
    }

    fn drop_primary_key_sql(&self, _name: &str, _table: &str) -> Result<String> {
        Err(self.not_supported("drop_primary_key"))
    }

    fn add_foreign_key_sql(&self, _table: &str, _foreign_key: &ForeignKey) -> Result<String> {
        Err(self.not_supported("add_foreign_key"))
    }

    fn drop_foreign_key_sql(&self, _name: &str, _table: &str) -> Result<String> {
        Err(self.not_supported("drop_foreign_key"))
    }

    fn drop_index_sql(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quoter.quote_table_name(name))
    }

    fn add_unique_sql(&self, _name: &str, _table: &str, _columns: &[String]) -> Result<String> {
        Err(self.not_supported("add_unique"))
    }

    fn drop_unique_sql(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quoter.quote_table_name(name))
    }

    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        _column: &ColumnSchema,
        value: i64,
    ) -> Result<String> {
        Ok(format!(
            "UPDATE sqlite_sequence SET seq={} WHERE name={}",
            self.quoter.quote_str(&(value - 1).to_string()),
            self.quoter.quote_str(&table.name)
        ))
    }

    fn last_insert_id_sql(&self, _sequence: Option<&str>) -> Result<String> {
        Ok("SELECT last_insert_rowid()".to_string())
    }
}
