//! Schema introspection against the live catalog.
//!
//! Each dialect module turns catalog rows into [`TableSchema`]s through
//! pure `parse_*` functions; this module owns the metadata caches and
//! dispatches by driver.

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

use std::sync::{Arc, PoisonError};

use keystone_core::cache::{build_key, invalidate_tags, TagDependency};
use keystone_core::{
    CacheExt, ColumnSchema, DriverName, Error as CoreError, Params, Row, SequenceInfo,
    TableSchema,
};
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;

pub use mssql::parse_columns as parse_mssql_columns;
pub use mysql::parse_columns as parse_mysql_columns;
pub use oracle::parse_columns as parse_oracle_columns;
pub use postgres::parse_columns as parse_pgsql_columns;
pub use sqlite::parse_columns as parse_sqlite_columns;

/// Schema introspection bound to one connection.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'c> {
    db: &'c Connection,
}

impl<'c> Schema<'c> {
    pub(crate) const fn new(db: &'c Connection) -> Self {
        Self { db }
    }

    /// Resolves `{{%name}}` and drops quoting, giving the catalog name.
    #[must_use]
    pub fn raw_table_name(&self, name: &str) -> String {
        self.db.query_builder().raw_table_name(name)
    }

    /// The tag invalidating every table of this connection in the shared
    /// cache.
    #[must_use]
    pub fn cache_tag(&self) -> String {
        build_key(&("keystone.schema", &self.db.config().dsn))
    }

    fn cache_key(&self, raw_name: &str) -> String {
        build_key(&("keystone.schema", &self.db.config().dsn, raw_name))
    }

    /// Returns the metadata of `name`, or `None` if the table does not
    /// exist.
    ///
    /// The catalog is read only when the table is not cached yet or when
    /// `refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns the driver error of a catalog query, or a serialization
    /// error from the shared cache.
    pub async fn get_table_schema(
        &self,
        name: &str,
        refresh: bool,
    ) -> Result<Option<Arc<TableSchema>>> {
        let raw = self.raw_table_name(name);
        if !refresh {
            if let Some(table) = self.local().get(&raw) {
                return Ok(Some(Arc::clone(table)));
            }
        }

        let config = self.db.config();
        let shared = self.db.cache().filter(|_| config.is_schema_cacheable(&raw));
        if let (false, Some(cache)) = (refresh, shared) {
            if let Some(table) = cache.get::<TableSchema>(&self.cache_key(&raw)) {
                debug!(table = %raw, "Table metadata read from cache");
                return Ok(Some(self.remember(&raw, table)));
            }
        }

        let loaded = self.load_table_schema(&raw).await?;
        let Some(table) = loaded else {
            self.local_mut().remove(&raw);
            return Ok(None);
        };
        if let Some(cache) = shared {
            let dependency = TagDependency::new([self.cache_tag()]);
            cache.set(
                &self.cache_key(&raw),
                &table,
                config.schema_cache_ttl(),
                Some(Box::new(dependency)),
            )?;
        }
        Ok(Some(self.remember(&raw, table)))
    }

    fn remember(&self, raw: &str, table: TableSchema) -> Arc<TableSchema> {
        let table = Arc::new(table);
        self.local_mut().insert(raw.to_string(), Arc::clone(&table));
        table
    }

    fn local(&self) -> std::sync::RwLockReadGuard<'_, std::collections::HashMap<String, Arc<TableSchema>>> {
        self.db.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, std::collections::HashMap<String, Arc<TableSchema>>> {
        self.db.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load_table_schema(&self, raw: &str) -> Result<Option<TableSchema>> {
        let mut parts = self.db.quoter().get_table_name_parts(raw, false);
        let name = parts.pop().unwrap_or_default();
        let schema_name = parts.pop();
        debug!(table = %raw, "Loading table metadata");
        let table = match self.db.driver_name() {
            DriverName::Sqlite => sqlite::load_table(self.db, schema_name, &name).await?,
            DriverName::Mysql => mysql::load_table(self.db, schema_name, &name).await?,
            DriverName::Pgsql => postgres::load_table(self.db, schema_name, &name).await?,
            DriverName::Sqlsrv => mssql::load_table(self.db, schema_name, &name).await?,
            DriverName::Oci => oracle::load_table(self.db, schema_name, &name).await?,
        };
        if let Some(ref table) = table {
            table.validate()?;
        }
        Ok(table)
    }

    /// Returns the names of every table (and view) in `schema`, or in the
    /// default schema.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn get_table_names(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let (sql, params) = match self.db.driver_name() {
            DriverName::Sqlite => sqlite::table_names_sql(),
            DriverName::Mysql => mysql::table_names_sql(self.db.quoter(), schema),
            DriverName::Pgsql => postgres::table_names_sql(schema),
            DriverName::Sqlsrv => mssql::table_names_sql(schema),
            DriverName::Oci => oracle::table_names_sql(schema),
        };
        let names = query_rows(self.db, &sql, params)
            .await?
            .iter()
            .filter_map(|row| row.first_value().and_then(keystone_core::SqlValue::to_text))
            .collect();
        Ok(names)
    }

    /// Returns the metadata of every table in `schema`.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn get_table_schemas(
        &self,
        schema: Option<&str>,
        refresh: bool,
    ) -> Result<Vec<Arc<TableSchema>>> {
        let mut tables = Vec::new();
        for name in self.get_table_names(schema).await? {
            let qualified = match schema {
                Some(schema) => format!("{schema}.{name}"),
                None => name,
            };
            if let Some(table) = self.get_table_schema(&qualified, refresh).await? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    /// Drops every cached table.
    pub fn refresh(&self) {
        self.local_mut().clear();
        if let (true, Some(cache)) = (self.db.config().enable_schema_cache, self.db.cache()) {
            invalidate_tags(cache, &[self.cache_tag()]);
        }
    }

    /// Drops one cached table.
    pub fn refresh_table_schema(&self, name: &str) {
        let raw = self.raw_table_name(name);
        self.local_mut().remove(&raw);
        if let Some(cache) = self.db.cache() {
            cache.delete(&self.cache_key(&raw));
        }
    }

    /// Makes `value` the next key generated for `table`'s auto-increment
    /// primary key and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] when `value` is not positive,
    /// the table does not exist, or its primary key is missing, composite
    /// or not auto-increment; otherwise the driver error.
    pub async fn reset_auto_increment_pk(&self, table: &str, value: i64) -> Result<i64> {
        if value <= 0 {
            return Err(CoreError::invalid_argument("The value must be greater than '0'.").into());
        }
        let schema = self.get_table_schema(table, false).await?;
        let builder = self.db.query_builder();
        let builder = match schema {
            Some(ref schema) => builder.with_schema(schema),
            None => builder,
        };
        let sql = builder.reset_auto_increment(table, value)?;
        self.db.create_command(sql, Params::new()).execute().await?;
        Ok(value)
    }

    /// Finds the sequence a trigger on `table` draws keys from.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSupported`] on every dialect but Oracle.
    pub async fn find_table_sequence_from_triggers(&self, table: &str) -> Result<Option<String>> {
        let driver = self.db.driver_name();
        if driver != DriverName::Oci {
            return Err(
                CoreError::not_supported("find_table_sequence_from_triggers", driver.as_str())
                    .into(),
            );
        }
        let raw = self.raw_table_name(table);
        let name = self
            .db
            .quoter()
            .get_table_name_parts(&raw, false)
            .pop()
            .unwrap_or_default();
        let (sql, params) = oracle::trigger_sequence_sql(&name);
        let rows = query_rows(self.db, &sql, params).await?;
        Ok(rows.first().and_then(|row| row.get_string("SEQUENCE_NAME")))
    }

    /// Reads the definition of `sequence`; `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSupported`] on MySQL and SQLite, which have
    /// no sequence objects.
    pub async fn get_sequence_info(&self, sequence: &str) -> Result<Option<SequenceInfo>> {
        let driver = self.db.driver_name();
        let (sql, params) = match driver {
            DriverName::Sqlite | DriverName::Mysql => {
                return Err(CoreError::not_supported("get_sequence_info", driver.as_str()).into())
            }
            DriverName::Pgsql => postgres::sequence_info_sql(sequence),
            DriverName::Sqlsrv => mssql::sequence_info_sql(sequence),
            DriverName::Oci => oracle::sequence_info_sql(sequence),
        };
        let rows = query_rows(self.db, &sql, params).await?;
        Ok(rows.first().map(parse_sequence_info))
    }

    /// Reads the last generated key of this connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] on Oracle without a sequence
    /// name, otherwise the driver error.
    pub async fn get_last_insert_id(&self, sequence: Option<&str>) -> Result<Option<i64>> {
        let sql = self.db.query_builder().last_insert_id(sequence)?;
        let value = self.db.create_command(sql, Params::new()).query_scalar().await?;
        Ok(value.and_then(|v| v.as_i64()))
    }
}

pub(crate) async fn query_rows(db: &Connection, sql: &str, params: Params) -> Result<Vec<Row>> {
    db.create_command(sql, params).query_all().await
}

/// Reads a sequence row with the columns `name`, `start_value`,
/// `increment`, `min_value`, `max_value` and `cycle`.
#[must_use]
pub fn parse_sequence_info(row: &Row) -> SequenceInfo {
    SequenceInfo {
        name: row.get_string("name").unwrap_or_default(),
        start: row.get_i64("start_value"),
        increment: row.get_i64("increment").unwrap_or(1),
        min_value: row.get_i64("min_value"),
        max_value: row.get_i64("max_value"),
        cycle: row.get_bool("cycle").unwrap_or(false),
    }
}

/// A database type split into its base name, `(...)` arguments and any
/// trailing words, e.g. `int(11) unsigned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DbType {
    pub base: String,
    pub args: Vec<String>,
    pub rest: String,
}

pub(crate) fn split_db_type(db_type: &str) -> DbType {
    let db_type = db_type.trim();
    let Some(open) = db_type.find('(') else {
        let (base, rest) = db_type.split_once(' ').unwrap_or((db_type, ""));
        return DbType {
            base: base.to_ascii_lowercase(),
            args: Vec::new(),
            rest: rest.trim().to_ascii_lowercase(),
        };
    };
    let close = db_type.rfind(')').filter(|c| *c > open).unwrap_or(db_type.len());
    let inner = db_type.get(open + 1..close).unwrap_or_default();
    DbType {
        base: db_type[..open].trim().to_ascii_lowercase(),
        args: split_args(inner),
        rest: db_type.get(close + 1..).unwrap_or_default().trim().to_ascii_lowercase(),
    }
}

/// Splits `a, b` or `'x','y,z'` on commas outside single quotes.
fn split_args(inner: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in inner.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => args.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Records size, precision and scale from the type arguments.
pub(crate) fn apply_type_args(column: &mut ColumnSchema, args: &[String]) {
    match args {
        [size] => {
            column.size = size.parse().ok();
            column.precision = column.size;
        }
        [precision, scale] => {
            column.precision = precision.parse().ok();
            column.size = column.precision;
            column.scale = scale.parse().ok();
        }
        _ => {}
    }
}

/// Looks `base` up in a database-type to abstract-type map.
pub(crate) fn abstract_type(map: &[(&str, &'static str)], base: &str) -> &'static str {
    map.iter()
        .find(|(db, _)| *db == base)
        .map_or(keystone_core::types::STRING, |(_, abstract_type)| abstract_type)
}

/// Strips the `(...)` wrappings SQL Server puts around defaults, as in
/// `((0))`. Only a leading `(` whose match is the final `)` is removed.
pub(crate) fn strip_parens(raw: &str) -> &str {
    let mut value = raw.trim();
    while wrapped_in_parens(value) {
        value = value[1..value.len() - 1].trim();
    }
    value
}

fn wrapped_in_parens(value: &str) -> bool {
    if !value.starts_with('(') || !value.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in value.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == value.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_db_type() {
        assert_eq!(
            split_db_type("int(11) unsigned"),
            DbType {
                base: "int".into(),
                args: vec!["11".into()],
                rest: "unsigned".into(),
            }
        );
        assert_eq!(split_db_type("DECIMAL(10, 2)").args, vec!["10", "2"]);
        assert_eq!(split_db_type("double precision").base, "double");
        assert_eq!(split_db_type("double precision").rest, "precision");
        assert_eq!(
            split_db_type("enum('a','b,c')").args,
            vec!["'a'", "'b,c'"]
        );
    }

    #[test]
    fn test_apply_type_args() {
        let mut column = ColumnSchema::new("price", "decimal", "decimal(10,2)");
        apply_type_args(&mut column, &["10".into(), "2".into()]);
        assert_eq!((column.size, column.precision, column.scale), (Some(10), Some(10), Some(2)));
    }

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("((0))"), "0");
        assert_eq!(strip_parens("('abc')"), "'abc'");
        assert_eq!(strip_parens("(getdate())"), "getdate()");
    }

    #[test]
    fn test_strip_parens_keeps_unmatched_outer_pair() {
        assert_eq!(strip_parens("(a) + (b)"), "(a) + (b)");
        assert_eq!(strip_parens("((a) + (b))"), "(a) + (b)");
        assert_eq!(strip_parens("(')(')"), "')('");
        assert_eq!(strip_parens("()"), "");
    }

    #[test]
    fn test_parse_sequence_info() {
        let row = Row::new()
            .with("name", "order_seq")
            .with("start_value", "5")
            .with("increment", 2_i64)
            .with("min_value", 1_i64)
            .with("max_value", None::<i64>)
            .with("cycle", "NO");
        let info = parse_sequence_info(&row);
        assert_eq!(info.name, "order_seq");
        assert_eq!(info.start, Some(5));
        assert_eq!(info.increment, 2);
        assert_eq!(info.max_value, None);
        assert!(!info.cycle);
    }
}
