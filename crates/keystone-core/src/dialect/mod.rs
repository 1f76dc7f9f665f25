//! Per-dialect SQL generation.
//!
//! Every supported database is one [`DialectDriver`] implementation. The
//! trait's default methods render the common forms through the helpers in
//! [`common`]; each driver overrides only what its database does
//! differently.

pub mod common;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use mssql::MssqlDriver;
pub use mysql::MysqlDriver;
pub use oracle::OracleDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use std::fmt;
use std::str::FromStr;

use crate::column::ColumnSchema;
use crate::column_builder::{ColumnFormat, RenderOptions};
use crate::error::{Error, Result};
use crate::query_builder::{PreparedInsert, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::{ForeignKey, TableSchema};
use crate::tokenizer::{PlaceholderStyle, SqlSyntax};

/// Driver names accepted in DSNs and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverName {
    Sqlite,
    Mysql,
    Pgsql,
    Sqlsrv,
    Oci,
}

impl DriverName {
    /// Resolves a driver name, accepting the usual aliases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Pgsql),
            "sqlsrv" | "mssql" | "dblib" => Ok(Self::Sqlsrv),
            "oci" | "oracle" => Ok(Self::Oci),
            other => Err(Error::InvalidConfig(format!("Unknown driver '{other}'."))),
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Pgsql => "pgsql",
            Self::Sqlsrv => "sqlsrv",
            Self::Oci => "oci",
        }
    }

    /// Returns the driver implementation.
    #[must_use]
    pub fn driver(self) -> &'static dyn DialectDriver {
        static SQLITE: SqliteDriver = SqliteDriver::new();
        static MYSQL: MysqlDriver = MysqlDriver::new();
        static PGSQL: PostgresDriver = PostgresDriver::new();
        static SQLSRV: MssqlDriver = MssqlDriver::new();
        static OCI: OracleDriver = OracleDriver::new();
        match self {
            Self::Sqlite => &SQLITE,
            Self::Mysql => &MYSQL,
            Self::Pgsql => &PGSQL,
            Self::Sqlsrv => &SQLSRV,
            Self::Oci => &OCI,
        }
    }
}

impl fmt::Display for DriverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Resolves a driver implementation by name.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for an unknown name.
pub fn driver_for(name: &str) -> Result<&'static dyn DialectDriver> {
    DriverName::from_name(name).map(DriverName::driver)
}

/// Optional clauses of `CREATE SEQUENCE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceOptions {
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cycle: bool,
    pub cache: Option<u32>,
}

/// Statement pieces of a multi-row INSERT.
///
/// The query builder writes `head`, then each row as `row_prefix(...)`
/// separated by `separator`, then `tail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    pub head: String,
    pub row_prefix: String,
    pub separator: &'static str,
    pub tail: &'static str,
}

/// SQL generation for one database dialect.
pub trait DialectDriver: fmt::Debug + Send + Sync {
    /// Returns the driver name.
    fn name(&self) -> DriverName;

    /// Returns the identifier and literal quoting rules.
    fn quoter(&self) -> &Quoter;

    /// Returns the lexical rules used for statement splitting.
    fn syntax(&self) -> SqlSyntax {
        SqlSyntax::ANSI
    }

    /// Returns how bound parameters are written for the driver.
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    /// Abstract type to database type map.
    fn type_map(&self) -> &'static [(&'static str, &'static str)];

    /// Segment layout of rendered column definitions.
    fn column_format(&self) -> ColumnFormat {
        ColumnFormat::BASE
    }

    /// Whether integer columns accept `UNSIGNED`.
    fn supports_unsigned(&self) -> bool {
        false
    }

    /// Whether column comments are written inline.
    fn inline_column_comment(&self) -> bool {
        false
    }

    /// Whether `AFTER col` / `FIRST` are supported.
    fn supports_column_position(&self) -> bool {
        false
    }

    /// Options for [`crate::ColumnSchemaBuilder::render`].
    fn column_render_options(&self) -> RenderOptions<'_> {
        RenderOptions {
            format: self.column_format(),
            quoter: self.quoter(),
            supports_unsigned: self.supports_unsigned(),
            inline_comment: self.inline_column_comment(),
            supports_position: self.supports_column_position(),
        }
    }

    /// Maps an abstract column definition to the database type.
    fn column_type(&self, definition: &str) -> String {
        common::map_column_type(self.type_map(), definition)
    }

    /// Renders an INSERT.
    fn insert_sql(&self, insert: &PreparedInsert<'_>) -> String {
        if insert.is_default_values() {
            self.default_values_sql(insert)
        } else {
            common::insert_sql(self.quoter(), insert, None)
        }
    }

    /// Renders an INSERT of a row made only of defaults.
    fn default_values_sql(&self, insert: &PreparedInsert<'_>) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", insert.table)
    }

    /// Renders an INSERT that returns the primary key values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] on dialects without a native
    /// returning clause.
    fn insert_returning_sql(
        &self,
        _insert: &PreparedInsert<'_>,
        _primary_key: &[String],
    ) -> Result<String> {
        Err(Error::not_supported("insert_with_returning_pks", self.name().as_str()))
    }

    /// Renders an insert-or-update.
    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String;

    /// Returns the layout of a multi-row INSERT.
    fn batch_insert_layout(&self, table: &str, columns: &str) -> BatchLayout {
        BatchLayout {
            head: format!("INSERT INTO {table}{columns} VALUES "),
            row_prefix: String::new(),
            separator: ", ",
            tail: "",
        }
    }

    /// Renders ORDER BY (already built, possibly empty) plus LIMIT/OFFSET.
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
        if let Some(limit) = limit {
            parts.push(format!("LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {offset}"));
        }
        parts.join(" ")
    }

    /// `CREATE TABLE`. An empty column name marks a raw constraint line.
    fn create_table_sql(
        &self,
        table: &str,
        columns: &[(String, String)],
        options: Option<&str>,
    ) -> String {
        common::create_table_sql(self.quoter(), table, columns, options)
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quoter().quote_table_name(table))
    }

    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        let q = self.quoter();
        format!(
            "ALTER TABLE {} RENAME TO {}",
            q.quote_table_name(old_name),
            q.quote_table_name(new_name)
        )
    }

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.quoter().quote_table_name(table))
    }

    fn add_column_sql(&self, table: &str, column: &str, column_type: &str) -> String {
        let q = self.quoter();
        format!(
            "ALTER TABLE {} ADD {} {column_type}",
            q.quote_table_name(table),
            q.quote_column_name(column)
        )
    }

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        let q = self.quoter();
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            q.quote_table_name(table),
            q.quote_column_name(column)
        )
    }

    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        let q = self.quoter();
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            q.quote_table_name(table),
            q.quote_column_name(old_name),
            q.quote_column_name(new_name)
        )
    }

    /// Changes a column's definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where columns cannot be altered.
    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Result<String> {
        let q = self.quoter();
        let column = q.quote_column_name(column);
        Ok(format!(
            "ALTER TABLE {} CHANGE {column} {column} {column_type}",
            q.quote_table_name(table)
        ))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where keys cannot be added later.
    fn add_primary_key_sql(&self, name: &str, table: &str, columns: &[String]) -> Result<String> {
        let q = self.quoter();
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            q.quote_table_name(table),
            q.quote_column_name(name),
            common::quote_columns(q, columns)
        ))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where keys cannot be dropped.
    fn drop_primary_key_sql(&self, name: &str, table: &str) -> Result<String> {
        Ok(common::drop_constraint_sql(self.quoter(), name, table))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where foreign keys cannot be added
    /// later, or the requested actions do not exist.
    fn add_foreign_key_sql(&self, table: &str, foreign_key: &ForeignKey) -> Result<String> {
        Ok(common::add_foreign_key_sql(self.quoter(), table, foreign_key))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where foreign keys cannot be dropped.
    fn drop_foreign_key_sql(&self, name: &str, table: &str) -> Result<String> {
        Ok(common::drop_constraint_sql(self.quoter(), name, table))
    }

    fn create_index_sql(&self, name: &str, table: &str, columns: &[String], unique: bool) -> String {
        let q = self.quoter();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            q.quote_table_name(name),
            q.quote_table_name(table),
            common::quote_columns(q, columns)
        )
    }

    fn drop_index_sql(&self, name: &str, table: &str) -> String {
        let q = self.quoter();
        format!(
            "DROP INDEX {} ON {}",
            q.quote_table_name(name),
            q.quote_table_name(table)
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where unique constraints cannot be
    /// added later.
    fn add_unique_sql(&self, name: &str, table: &str, columns: &[String]) -> Result<String> {
        let q = self.quoter();
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            q.quote_table_name(table),
            q.quote_column_name(name),
            common::quote_columns(q, columns)
        ))
    }

    fn drop_unique_sql(&self, name: &str, table: &str) -> String {
        common::drop_constraint_sql(self.quoter(), name, table)
    }

    /// Whether the database has sequence objects.
    fn supports_sequences(&self) -> bool {
        false
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    fn create_sequence_sql(
        &self,
        name: &str,
        start: i64,
        increment: i64,
        options: &SequenceOptions,
    ) -> Result<String> {
        if !self.supports_sequences() {
            return Err(Error::not_supported("create_sequence", self.name().as_str()));
        }
        Ok(common::create_sequence_sql(self.quoter(), name, start, increment, options))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    fn drop_sequence_sql(&self, name: &str) -> Result<String> {
        if !self.supports_sequences() {
            return Err(Error::not_supported("drop_sequence", self.name().as_str()));
        }
        Ok(format!("DROP SEQUENCE {}", self.quoter().quote_table_name(name)))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    fn reset_sequence_sql(&self, name: &str, value: i64) -> Result<String> {
        if !self.supports_sequences() {
            return Err(Error::not_supported("reset_sequence", self.name().as_str()));
        }
        Ok(format!(
            "ALTER SEQUENCE {} RESTART WITH {value}",
            self.quoter().quote_table_name(name)
        ))
    }

    /// Renders the statement(s) making the next generated key `value`.
    ///
    /// Several statements are joined with `; `.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the column has no backing
    /// generator the dialect can reset.
    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        column: &ColumnSchema,
        value: i64,
    ) -> Result<String>;

    /// Renders the query reading the last generated key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the dialect needs a sequence
    /// name and none was given.
    fn last_insert_id_sql(&self, sequence: Option<&str>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_name_aliases() {
        assert_eq!(DriverName::from_name("postgres").unwrap(), DriverName::Pgsql);
        assert_eq!(DriverName::from_name("PGSQL").unwrap(), DriverName::Pgsql);
        assert_eq!(DriverName::from_name("mssql").unwrap(), DriverName::Sqlsrv);
        assert_eq!("oracle".parse::<DriverName>().unwrap(), DriverName::Oci);
        assert!(matches!(
            DriverName::from_name("db2"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_driver_for_returns_matching_driver() {
        for name in ["sqlite", "mysql", "pgsql", "sqlsrv", "oci"] {
            let driver = driver_for(name).unwrap();
            assert_eq!(driver.name().as_str(), name);
        }
    }

    #[test]
    fn test_sequences_not_supported_without_sequence_objects() {
        for name in [DriverName::Sqlite, DriverName::Mysql] {
            let driver = name.driver();
            let err = driver
                .create_sequence_sql("seq", 1, 1, &SequenceOptions::default())
                .unwrap_err();
            assert!(err.is_not_supported());
            assert!(driver.drop_sequence_sql("seq").unwrap_err().is_not_supported());
            assert!(driver.reset_sequence_sql("seq", 3).unwrap_err().is_not_supported());
        }
    }

    #[test]
    fn test_create_then_drop_sequence_round_trip() {
        let pg = DriverName::Pgsql.driver();
        let options = SequenceOptions {
            min_value: Some(1),
            max_value: Some(1000),
            cycle: true,
            cache: None,
        };
        assert_eq!(
            pg.create_sequence_sql("order_seq", 5, 2, &options).unwrap(),
            "CREATE SEQUENCE \"order_seq\" START WITH 5 INCREMENT BY 2 MINVALUE 1 MAXVALUE 1000 CYCLE"
        );
        assert_eq!(pg.drop_sequence_sql("order_seq").unwrap(), "DROP SEQUENCE \"order_seq\"");

        let mssql = DriverName::Sqlsrv.driver();
        assert_eq!(
            mssql
                .create_sequence_sql("dbo.order_seq", 1, 1, &SequenceOptions::default())
                .unwrap(),
            "CREATE SEQUENCE [dbo].[order_seq] START WITH 1 INCREMENT BY 1"
        );
        assert_eq!(
            mssql.drop_sequence_sql("dbo.order_seq").unwrap(),
            "DROP SEQUENCE [dbo].[order_seq]"
        );
    }
}
