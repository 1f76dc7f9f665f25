//! SQL execution with bound parameters.

use std::sync::Arc;

use keystone_core::query::ColumnValue;
use keystone_core::tokenizer::{bind_positional, split_with_params, Lexer, SplitStatement, TokenKind};
use keystone_core::{
    ColumnSchema, ColumnType, Condition, DriverName, ForeignKey, InsertSource, Params,
    QueryBuilder, Row, SequenceOptions, SqlValue, TableSchema, ToSqlValue, UpsertUpdate,
};
use sqlx::AnyConnection;
use tracing::{debug, warn};

use crate::connection::{control, Connection};
use crate::error::{Error, Result};
use crate::row::{bind_values, decode_row};

/// Outcome of [`Command::insert_with_returning_pks`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult {
    /// Primary key values of the inserted row, by column name.
    Keys(Row),
    /// The table has no primary key; the number of inserted rows.
    Affected(u64),
}

impl InsertResult {
    /// Returns the key row, if the table has a primary key.
    #[must_use]
    pub const fn keys(&self) -> Option<&Row> {
        match self {
            Self::Keys(row) => Some(row),
            Self::Affected(_) => None,
        }
    }
}

/// A SQL statement (or script) with its parameters, bound to a connection.
///
/// Builder methods render through the connection's query builder and
/// replace the command's SQL; their parameters are added to the ones
/// already bound.
#[derive(Debug)]
pub struct Command<'c> {
    db: &'c Connection,
    sql: String,
    params: Params,
    atomic: bool,
    refresh_table: Option<String>,
}

impl<'c> Command<'c> {
    pub(crate) fn new(db: &'c Connection, sql: &str, params: Params) -> Self {
        Self {
            db,
            sql: db.quoter().quote_sql(sql, db.table_prefix()),
            params,
            atomic: true,
            refresh_table: None,
        }
    }

    /// The SQL to execute, with table and column tokens quoted.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Replaces the SQL, quoting `{{table}}` and `[[column]]` tokens.
    #[must_use]
    pub fn set_sql(mut self, sql: &str) -> Self {
        self.sql = self.db.quoter().quote_sql(sql, self.db.table_prefix());
        self
    }

    #[must_use]
    pub fn bind_value(mut self, name: &str, value: impl ToSqlValue) -> Self {
        self.params.insert(name, value);
        self
    }

    #[must_use]
    pub fn bind_values(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Whether a multi-statement script runs in its own transaction when
    /// none is active. On by default.
    #[must_use]
    pub const fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// The SQL with every bound placeholder replaced by its quoted value.
    ///
    /// For logging only; never execute the result.
    #[must_use]
    pub fn raw_sql(&self) -> String {
        let quoter = self.db.quoter();
        let mut out = String::with_capacity(self.sql.len());
        for token in Lexer::new(&self.sql, self.db.driver().syntax()) {
            let text = token.span.slice(&self.sql);
            match (token.kind, self.params.get(text)) {
                (TokenKind::Placeholder, Some(value)) => out.push_str(&quoter.quote_value(value)),
                _ => out.push_str(text),
            }
        }
        out
    }

    /// Executes the SQL and returns the rows affected by its last
    /// statement.
    ///
    /// A script is split into statements, each bound with only the
    /// parameters it references. The first failure stops the script.
    ///
    /// # Errors
    ///
    /// Returns the driver error of the failing statement.
    pub async fn execute(&self) -> Result<u64> {
        let statements = split_with_params(&self.sql, &self.params, self.db.driver().syntax());
        let mut handle = self.db.lock().await;
        let wrap = self.atomic && statements.len() > 1 && self.db.transaction_level() == 0;
        if wrap {
            control(&mut handle, "BEGIN").await?;
        }

        let mut affected = 0;
        for statement in &statements {
            match self.run(&mut handle, statement).await {
                Ok(rows) => affected = rows,
                Err(err) => {
                    if wrap {
                        if let Err(rollback_err) = control(&mut handle, "ROLLBACK").await {
                            warn!(error = %rollback_err, "Rollback of a failed script failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
        if wrap {
            control(&mut handle, "COMMIT").await?;
        }
        drop(handle);

        if let Some(ref table) = self.refresh_table {
            self.db.schema().refresh_table_schema(table);
        }
        Ok(affected)
    }

    async fn run(&self, handle: &mut AnyConnection, statement: &SplitStatement) -> Result<u64> {
        let driver = self.db.driver();
        let (sql, values) = bind_positional(
            &statement.sql,
            &statement.params,
            driver.placeholder_style(),
            driver.syntax(),
        );
        debug!(sql = %sql, "Executing SQL");
        let result = bind_values(sqlx::query(&sql), values).execute(handle).await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, handle: &mut AnyConnection) -> Result<Vec<Row>> {
        let driver = self.db.driver();
        let (sql, values) = bind_positional(
            &self.sql,
            &self.params,
            driver.placeholder_style(),
            driver.syntax(),
        );
        debug!(sql = %sql, "Querying SQL");
        let rows = bind_values(sqlx::query(&sql), values).fetch_all(handle).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    /// Returns every row.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn query_all(&self) -> Result<Vec<Row>> {
        let mut handle = self.db.lock().await;
        self.fetch(&mut handle).await
    }

    /// Returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn query_one(&self) -> Result<Option<Row>> {
        Ok(self.query_all().await?.into_iter().next())
    }

    /// Returns the first column of the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn query_scalar(&self) -> Result<Option<SqlValue>> {
        Ok(self
            .query_one()
            .await?
            .and_then(|row| row.first_value().cloned()))
    }

    /// Returns the first column of every row.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn query_column(&self) -> Result<Vec<SqlValue>> {
        Ok(self
            .query_all()
            .await?
            .iter()
            .map(|row| row.first_value().cloned().unwrap_or(SqlValue::Null))
            .collect())
    }

    /// Renders with the metadata of `table` attached to the builder.
    async fn render_for_table<F>(mut self, table: &str, render: F) -> Result<Self>
    where
        F: FnOnce(&QueryBuilder<'_>, &mut Params) -> String,
    {
        let schema = self.db.schema().get_table_schema(table, false).await?;
        let mut params = std::mem::take(&mut self.params);
        let sql = {
            let builder = self.db.query_builder();
            let builder = match schema {
                Some(ref schema) => builder.with_schema(schema),
                None => builder,
            };
            render(&builder, &mut params)
        };
        self.params = params;
        Ok(self.set_sql(&sql))
    }

    fn render<F>(mut self, render: F) -> Self
    where
        F: FnOnce(&QueryBuilder<'_>, &mut Params) -> String,
    {
        let mut params = std::mem::take(&mut self.params);
        let sql = render(&self.db.query_builder(), &mut params);
        self.params = params;
        self.set_sql(&sql)
    }

    fn render_ddl(self, table: &str, sql: keystone_core::Result<String>) -> Result<Self> {
        let mut command = self.set_sql(&sql?);
        command.refresh_table = Some(table.to_string());
        Ok(command)
    }

    /// Sets an INSERT.
    ///
    /// # Errors
    ///
    /// Returns the driver error when loading the table metadata fails.
    pub async fn insert(self, table: &str, source: impl Into<InsertSource>) -> Result<Self> {
        let source = source.into();
        self.render_for_table(table, |qb, params| qb.insert(table, source, params))
            .await
    }

    /// Sets an insert-or-update keyed on the table's unique constraints.
    ///
    /// # Errors
    ///
    /// Returns the driver error when loading the table metadata fails.
    pub async fn upsert(
        self,
        table: &str,
        insert: impl Into<InsertSource>,
        update: impl Into<UpsertUpdate>,
    ) -> Result<Self> {
        let (insert, update) = (insert.into(), update.into());
        self.render_for_table(table, |qb, params| qb.upsert(table, insert, update, params))
            .await
    }

    /// Sets a multi-row INSERT. No rows leaves the command empty.
    ///
    /// # Errors
    ///
    /// Returns the driver error when loading the table metadata fails.
    pub async fn batch_insert<C, R, V>(
        self,
        table: &str,
        columns: &[C],
        rows: impl IntoIterator<Item = R>,
    ) -> Result<Self>
    where
        C: AsRef<str>,
        R: IntoIterator<Item = V>,
        V: ToSqlValue,
    {
        self.render_for_table(table, |qb, params| {
            qb.batch_insert(table, columns, rows, params)
        })
        .await
    }

    /// Sets an UPDATE.
    ///
    /// # Errors
    ///
    /// Returns the driver error when loading the table metadata fails.
    pub async fn update<K, V>(
        self,
        table: &str,
        columns: impl IntoIterator<Item = (K, V)>,
        condition: Option<&Condition>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<ColumnValue>,
    {
        self.render_for_table(table, |qb, params| {
            qb.update(table, columns, condition, params)
        })
        .await
    }

    /// Sets a DELETE.
    #[must_use]
    pub fn delete(self, table: &str, condition: Option<&Condition>) -> Self {
        self.render(|qb, params| qb.delete(table, condition, params))
    }

    /// Sets a CREATE TABLE.
    #[must_use]
    pub fn create_table<K, V>(
        self,
        table: &str,
        columns: impl IntoIterator<Item = (K, V)>,
        options: Option<&str>,
    ) -> Self
    where
        K: AsRef<str>,
        V: Into<ColumnType>,
    {
        let mut command = self.render(|qb, _| qb.create_table(table, columns, options));
        command.refresh_table = Some(table.to_string());
        command
    }

    #[must_use]
    pub fn drop_table(self, table: &str) -> Self {
        let mut command = self.render(|qb, _| qb.drop_table(table));
        command.refresh_table = Some(table.to_string());
        command
    }

    #[must_use]
    pub fn rename_table(self, old_name: &str, new_name: &str) -> Self {
        let mut command = self.render(|qb, _| qb.rename_table(old_name, new_name));
        command.refresh_table = Some(old_name.to_string());
        command
    }

    #[must_use]
    pub fn truncate_table(self, table: &str) -> Self {
        self.render(|qb, _| qb.truncate_table(table))
    }

    #[must_use]
    pub fn add_column(self, table: &str, column: &str, column_type: impl Into<ColumnType>) -> Self {
        let mut command = self.render(|qb, _| qb.add_column(table, column, column_type));
        command.refresh_table = Some(table.to_string());
        command
    }

    #[must_use]
    pub fn drop_column(self, table: &str, column: &str) -> Self {
        let mut command = self.render(|qb, _| qb.drop_column(table, column));
        command.refresh_table = Some(table.to_string());
        command
    }

    #[must_use]
    pub fn rename_column(self, table: &str, old_name: &str, new_name: &str) -> Self {
        let mut command = self.render(|qb, _| qb.rename_column(table, old_name, new_name));
        command.refresh_table = Some(table.to_string());
        command
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite.
    pub fn alter_column(
        self,
        table: &str,
        column: &str,
        column_type: impl Into<ColumnType>,
    ) -> Result<Self> {
        let sql = self.db.query_builder().alter_column(table, column, column_type);
        self.render_ddl(table, sql)
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite.
    pub fn add_primary_key<S: AsRef<str>>(self, name: &str, table: &str, columns: &[S]) -> Result<Self> {
        let sql = self.db.query_builder().add_primary_key(name, table, columns);
        self.render_ddl(table, sql)
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite.
    pub fn drop_primary_key(self, name: &str, table: &str) -> Result<Self> {
        let sql = self.db.query_builder().drop_primary_key(name, table);
        self.render_ddl(table, sql)
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite, and on
    /// Oracle for an ON UPDATE action.
    pub fn add_foreign_key(self, table: &str, foreign_key: &ForeignKey) -> Result<Self> {
        let sql = self.db.query_builder().add_foreign_key(table, foreign_key);
        self.render_ddl(table, sql)
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite.
    pub fn drop_foreign_key(self, name: &str, table: &str) -> Result<Self> {
        let sql = self.db.query_builder().drop_foreign_key(name, table);
        self.render_ddl(table, sql)
    }

    #[must_use]
    pub fn create_index<S: AsRef<str>>(
        self,
        name: &str,
        table: &str,
        columns: &[S],
        unique: bool,
    ) -> Self {
        let mut command = self.render(|qb, _| qb.create_index(name, table, columns, unique));
        command.refresh_table = Some(table.to_string());
        command
    }

    #[must_use]
    pub fn drop_index(self, name: &str, table: &str) -> Self {
        let mut command = self.render(|qb, _| qb.drop_index(name, table));
        command.refresh_table = Some(table.to_string());
        command
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on SQLite.
    pub fn add_unique<S: AsRef<str>>(self, name: &str, table: &str, columns: &[S]) -> Result<Self> {
        let sql = self.db.query_builder().add_unique(name, table, columns);
        self.render_ddl(table, sql)
    }

    #[must_use]
    pub fn drop_unique(self, name: &str, table: &str) -> Self {
        let mut command = self.render(|qb, _| qb.drop_unique(name, table));
        command.refresh_table = Some(table.to_string());
        command
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on MySQL and SQLite.
    pub fn create_sequence(
        self,
        name: &str,
        start: i64,
        increment: i64,
        options: &SequenceOptions,
    ) -> Result<Self> {
        let sql = self.db.query_builder().create_sequence(name, start, increment, options)?;
        Ok(self.set_sql(&sql))
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on MySQL and SQLite.
    pub fn drop_sequence(self, name: &str) -> Result<Self> {
        let sql = self.db.query_builder().drop_sequence(name)?;
        Ok(self.set_sql(&sql))
    }

    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] on MySQL and SQLite.
    pub fn reset_sequence(self, name: &str, value: i64) -> Result<Self> {
        let sql = self.db.query_builder().reset_sequence(name, value)?;
        Ok(self.set_sql(&sql))
    }

    /// Inserts one row and returns its primary key values.
    ///
    /// Uses the dialect's returning clause where there is one. Otherwise
    /// the row is inserted and each key column is read back: the last
    /// generated id for the auto-increment column, the supplied value or
    /// the column default for the others.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the insert fails.
    pub async fn insert_with_returning_pks(
        self,
        table: &str,
        source: impl Into<InsertSource>,
    ) -> Result<InsertResult> {
        let source = source.into();
        let Some(schema) = self.db.schema().get_table_schema(table, false).await? else {
            return Ok(InsertResult::Affected(self.insert(table, source).await?.execute().await?));
        };
        if schema.primary_key.is_empty() {
            return Ok(InsertResult::Affected(self.insert(table, source).await?.execute().await?));
        }

        let db = self.db;
        let builder = db.query_builder().with_schema(&schema);
        let mut params = self.params.clone();
        match builder.insert_with_returning_pks(table, source.clone(), &mut params) {
            Ok(sql) => {
                let row = db.create_command(sql, params).query_one().await?;
                return row
                    .map(InsertResult::Keys)
                    .ok_or_else(|| Error::NoRow(format!("insert into '{table}'")));
            }
            Err(err) if err.is_not_supported() => {}
            Err(err) => return Err(err.into()),
        }

        let sequence = self.sequence_for(&schema).await?;
        let last_id_sql = match schema.auto_increment_column() {
            Some(_) => Some(builder.last_insert_id(sequence.as_deref())?),
            None => None,
        };
        let insert = self.insert(table, source.clone()).await?;

        let mut handle = db.lock().await;
        let statements = split_with_params(&insert.sql, &insert.params, db.driver().syntax());
        for statement in &statements {
            insert.run(&mut handle, statement).await?;
        }
        let last_id = match last_id_sql {
            Some(sql) => {
                let rows = db.create_command(sql, Params::new()).fetch(&mut handle).await?;
                rows.first().and_then(|row| row.first_value().cloned())
            }
            None => None,
        };
        drop(handle);

        let mut keys = Row::new();
        for column in schema.primary_key_columns() {
            let value = if column.auto_increment {
                last_id.clone().unwrap_or(SqlValue::Null)
            } else {
                supplied_value(&source, column)
            };
            keys.push(column.name.clone(), value);
        }
        Ok(InsertResult::Keys(keys))
    }

    /// The sequence the last generated id is read from.
    async fn sequence_for(&self, schema: &Arc<TableSchema>) -> Result<Option<String>> {
        let declared = schema
            .auto_increment_column()
            .and_then(|c| c.sequence_name.clone())
            .or_else(|| schema.sequence_name.clone());
        match (self.db.driver_name(), declared) {
            (DriverName::Oci, None) => {
                self.db
                    .schema()
                    .find_table_sequence_from_triggers(&schema.full_name)
                    .await
            }
            (_, declared) => Ok(declared),
        }
    }
}

/// The value supplied for a key column, or its default.
fn supplied_value(source: &InsertSource, column: &ColumnSchema) -> SqlValue {
    let supplied = match source {
        InsertSource::Values(pairs) => pairs.iter().find_map(|(name, value)| match value {
            ColumnValue::Value(value) if *name == column.name => Some(column.db_typecast(value.clone())),
            _ => None,
        }),
        InsertSource::Select { .. } => None,
    };
    supplied
        .or_else(|| column.default.as_ref().and_then(|d| d.to_sql_value()))
        .unwrap_or(SqlValue::Null)
}
