//! Renders structured descriptions into parameterized SQL.
//!
//! [`QueryBuilder`] binds every value into the caller's [`Params`] and asks
//! the [`DialectDriver`] for the statement shape. Table metadata, when
//! available through a [`SchemaSource`], drives value typecasting, primary
//! key discovery and upsert conflict keys.

mod condition;
mod ddl;

use std::sync::OnceLock;

use regex::Regex;

use crate::column::ColumnSchema;
use crate::column_builder::ColumnType;
use crate::dialect::{common, DialectDriver};
use crate::error::Result;
use crate::params::Params;
use crate::query::{ColumnValue, InsertSource, Query, UpsertUpdate};
use crate::quoter::Quoter;
use crate::table::{NoSchema, SchemaSource, TableSchema};
use crate::value::ToSqlValue;

/// The VALUES part of a prepared INSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertValues {
    /// One row of placeholders or expressions.
    Row(Vec<String>),
    /// A rendered SELECT.
    Select(String),
    /// No columns: every column takes its default.
    Default,
}

/// An INSERT with its values already bound.
#[derive(Debug, Clone)]
pub struct PreparedInsert<'a> {
    /// Quoted table name.
    pub table: String,
    /// Table metadata, when known.
    pub schema: Option<&'a TableSchema>,
    /// Unquoted target column names.
    pub columns: Vec<String>,
    pub values: InsertValues,
}

impl PreparedInsert<'_> {
    /// Returns true when the insert has no columns.
    #[must_use]
    pub const fn is_default_values(&self) -> bool {
        matches!(self.values, InsertValues::Default)
    }
}

/// The new value of a column updated by an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    /// The value that was about to be inserted.
    Excluded,
    /// A bound placeholder or raw expression.
    Sql(String),
}

/// What an upsert does on conflict, after planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    Ignore,
    Update(Vec<(String, UpdateSource)>),
}

/// An upsert with its conflict keys resolved.
#[derive(Debug, Clone)]
pub struct PreparedUpsert<'a> {
    pub insert: PreparedInsert<'a>,
    /// Constraints fully covered by the inserted columns; never empty.
    pub constraints: Vec<Vec<String>>,
    pub action: UpsertAction,
}

impl PreparedUpsert<'_> {
    /// Returns the columns to update, or `None` for insert-or-ignore.
    #[must_use]
    pub fn updates(&self) -> Option<&[(String, UpdateSource)]> {
        match self.action {
            UpsertAction::Ignore => None,
            UpsertAction::Update(ref updates) => Some(updates),
        }
    }
}

/// Dialect-aware SQL renderer.
#[derive(Clone, Copy)]
pub struct QueryBuilder<'a> {
    driver: &'a dyn DialectDriver,
    tables: &'a dyn SchemaSource,
    table_prefix: &'a str,
}

impl std::fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("driver", &self.driver.name())
            .field("table_prefix", &self.table_prefix)
            .finish_non_exhaustive()
    }
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder that knows no table metadata.
    #[must_use]
    pub fn new(driver: &'a dyn DialectDriver) -> Self {
        Self {
            driver,
            tables: &NoSchema,
            table_prefix: "",
        }
    }

    /// Uses `tables` for column typing and key discovery.
    #[must_use]
    pub fn with_schema(self, tables: &'a dyn SchemaSource) -> Self {
        Self { tables, ..self }
    }

    /// Sets the prefix substituted for `%` in `{{%table}}` names.
    #[must_use]
    pub fn with_table_prefix(self, table_prefix: &'a str) -> Self {
        Self {
            table_prefix,
            ..self
        }
    }

    #[must_use]
    pub fn driver(&self) -> &'a dyn DialectDriver {
        self.driver
    }

    #[must_use]
    pub const fn table_prefix(&self) -> &'a str {
        self.table_prefix
    }

    #[must_use]
    pub fn quoter(&self) -> &'a Quoter {
        self.driver.quoter()
    }

    /// Returns the plain name of `table`: `{{%name}}` placeholders are
    /// resolved and quotes removed.
    #[must_use]
    pub fn raw_table_name(&self, table: &str) -> String {
        let name = table
            .strip_prefix("{{")
            .and_then(|t| t.strip_suffix("}}"))
            .map_or_else(|| table.to_string(), |t| t.replace('%', self.table_prefix));
        self.quoter().get_table_name_parts(&name, false).join(".")
    }

    /// Returns the metadata of `table`, if the schema source knows it.
    #[must_use]
    pub fn table_schema(&self, table: &str) -> Option<&'a TableSchema> {
        self.tables.table_schema(&self.raw_table_name(table))
    }

    /// Resolves a column definition to the dialect's type.
    ///
    /// Unknown abstract types are returned unchanged.
    #[must_use]
    pub fn get_column_type(&self, column_type: impl Into<ColumnType>) -> String {
        let definition = column_type.into().to_abstract(self.driver);
        self.driver.column_type(&definition)
    }

    /// Binds `value` (or inlines an expression) and returns its SQL.
    fn render_value(
        &self,
        params: &mut Params,
        column: Option<&ColumnSchema>,
        value: ColumnValue,
    ) -> String {
        match value {
            ColumnValue::Value(value) => {
                let value = match column {
                    Some(column) => column.db_typecast(value),
                    None => value,
                };
                params.bind(value)
            }
            ColumnValue::Expression(expression) => {
                params.extend(expression.params);
                expression.sql
            }
        }
    }

    /// Binds an INSERT's values.
    #[must_use]
    pub fn prepare_insert(
        &self,
        table: &str,
        source: InsertSource,
        params: &mut Params,
    ) -> PreparedInsert<'a> {
        let schema = self.table_schema(table);
        let (columns, values) = match source {
            InsertSource::Values(pairs) if pairs.is_empty() => (Vec::new(), InsertValues::Default),
            InsertSource::Values(pairs) => {
                let mut columns = Vec::with_capacity(pairs.len());
                let mut placeholders = Vec::with_capacity(pairs.len());
                for (name, value) in pairs {
                    let column = schema.and_then(|s| s.column(&name));
                    placeholders.push(self.render_value(params, column, value));
                    columns.push(name);
                }
                (columns, InsertValues::Row(placeholders))
            }
            InsertSource::Select { columns, query } => {
                let select = self.build_select(&query, params);
                (columns, InsertValues::Select(select))
            }
        };
        PreparedInsert {
            table: self.quoter().quote_table_name(table),
            schema,
            columns,
            values,
        }
    }

    /// Renders an INSERT.
    ///
    /// No columns renders the dialect's default-values form.
    #[must_use]
    pub fn insert(&self, table: &str, source: impl Into<InsertSource>, params: &mut Params) -> String {
        let prepared = self.prepare_insert(table, source.into(), params);
        self.driver.insert_sql(&prepared)
    }

    /// Renders an INSERT that returns the primary key values.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotSupported`] on dialects without a native
    /// returning clause.
    pub fn insert_with_returning_pks(
        &self,
        table: &str,
        source: impl Into<InsertSource>,
        params: &mut Params,
    ) -> Result<String> {
        let prepared = self.prepare_insert(table, source.into(), params);
        let primary_key = prepared
            .schema
            .map(|s| s.primary_key.clone())
            .unwrap_or_default();
        self.driver.insert_returning_sql(&prepared, &primary_key)
    }

    /// Renders an insert-or-update keyed on the table's unique constraints.
    ///
    /// Only constraints whose columns are all inserted take part. Without
    /// any, a plain INSERT is rendered.
    #[must_use]
    pub fn upsert(
        &self,
        table: &str,
        insert: impl Into<InsertSource>,
        update: impl Into<UpsertUpdate>,
        params: &mut Params,
    ) -> String {
        let prepared = self.prepare_insert(table, insert.into(), params);
        let constraints = conflict_constraints(prepared.schema, &prepared.columns);
        if constraints.is_empty() {
            return self.driver.insert_sql(&prepared);
        }

        let action = match update.into() {
            UpsertUpdate::None => UpsertAction::Ignore,
            UpsertUpdate::All => {
                let updates: Vec<(String, UpdateSource)> = prepared
                    .columns
                    .iter()
                    .filter(|c| !constraints.iter().any(|keys| keys.contains(*c)))
                    .map(|c| (c.clone(), UpdateSource::Excluded))
                    .collect();
                if updates.is_empty() {
                    UpsertAction::Ignore
                } else {
                    UpsertAction::Update(updates)
                }
            }
            UpsertUpdate::Columns(pairs) if pairs.is_empty() => UpsertAction::Ignore,
            UpsertUpdate::Columns(pairs) => UpsertAction::Update(
                pairs
                    .into_iter()
                    .map(|(name, value)| {
                        let column = prepared.schema.and_then(|s| s.column(&name));
                        let sql = self.render_value(params, column, value);
                        (name, UpdateSource::Sql(sql))
                    })
                    .collect(),
            ),
        };

        self.driver.upsert_sql(&PreparedUpsert {
            insert: prepared,
            constraints,
            action,
        })
    }

    /// Renders one multi-row INSERT.
    ///
    /// `rows` is consumed lazily, one row at a time. No rows renders an
    /// empty string.
    pub fn batch_insert<C, R, V>(
        &self,
        table: &str,
        columns: &[C],
        rows: impl IntoIterator<Item = R>,
        params: &mut Params,
    ) -> String
    where
        C: AsRef<str>,
        R: IntoIterator<Item = V>,
        V: ToSqlValue,
    {
        let mut rows = rows.into_iter().peekable();
        if rows.peek().is_none() {
            return String::new();
        }

        let schema = self.table_schema(table);
        let typed: Vec<Option<&ColumnSchema>> = columns
            .iter()
            .map(|c| schema.and_then(|s| s.column(c.as_ref())))
            .collect();
        let quoter = self.quoter();
        let layout = self.driver.batch_insert_layout(
            &quoter.quote_table_name(table),
            &common::column_list(quoter, columns),
        );

        let mut sql = layout.head;
        for (i, row) in rows.enumerate() {
            if i > 0 {
                sql.push_str(layout.separator);
            }
            sql.push_str(&layout.row_prefix);
            sql.push('(');
            for (j, value) in row.into_iter().enumerate() {
                if j > 0 {
                    sql.push_str(", ");
                }
                let value = value.to_sql_value();
                let value = match typed.get(j).copied().flatten() {
                    Some(column) => column.db_typecast(value),
                    None => value,
                };
                sql.push_str(&params.bind(value));
            }
            sql.push(')');
        }
        sql.push_str(layout.tail);
        sql
    }

    /// Renders an UPDATE.
    pub fn update<K, V>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = (K, V)>,
        condition: Option<&crate::query::Condition>,
        params: &mut Params,
    ) -> String
    where
        K: Into<String>,
        V: Into<ColumnValue>,
    {
        let schema = self.table_schema(table);
        let quoter = self.quoter();
        let sets: Vec<String> = columns
            .into_iter()
            .map(|(name, value)| {
                let name = name.into();
                let column = schema.and_then(|s| s.column(&name));
                let value = self.render_value(params, column, value.into());
                format!("{}={value}", quoter.quote_column_name(&name))
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            quoter.quote_table_name(table),
            sets.join(", ")
        );
        self.push_where(&mut sql, condition, params);
        sql
    }

    /// Renders a DELETE.
    #[must_use]
    pub fn delete(
        &self,
        table: &str,
        condition: Option<&crate::query::Condition>,
        params: &mut Params,
    ) -> String {
        let mut sql = format!("DELETE FROM {}", self.quoter().quote_table_name(table));
        self.push_where(&mut sql, condition, params);
        sql
    }

    fn push_where(
        &self,
        sql: &mut String,
        condition: Option<&crate::query::Condition>,
        params: &mut Params,
    ) {
        if let Some(condition) = condition {
            let rendered = self.build_condition(condition, params);
            if !rendered.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&rendered);
            }
        }
    }

    /// Renders a SELECT.
    #[must_use]
    pub fn build_select(&self, query: &Query, params: &mut Params) -> String {
        params.extend(query.params.clone());
        let quoter = self.quoter();

        let mut sql = String::from(if query.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        if query.select.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = query
                .select
                .iter()
                .map(|c| self.quote_select_column(c))
                .collect();
            sql.push_str(&columns.join(", "));
        }

        if !query.from.is_empty() {
            let tables: Vec<String> = query
                .from
                .iter()
                .map(|t| quoter.quote_table_name(t))
                .collect();
            sql.push_str(" FROM ");
            sql.push_str(&tables.join(", "));
        }

        self.push_where(&mut sql, query.condition.as_ref(), params);

        if !query.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&common::quote_columns(quoter, &query.group_by));
        }
        if let Some(ref having) = query.having {
            let rendered = self.build_condition(having, params);
            if !rendered.is_empty() {
                sql.push_str(" HAVING ");
                sql.push_str(&rendered);
            }
        }

        let order_by = if query.order_by.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = query
                .order_by
                .iter()
                .map(|(c, o)| format!("{} {}", quoter.quote_column_name(c), o.as_sql()))
                .collect();
            format!("ORDER BY {}", parts.join(", "))
        };
        let tail = self
            .driver
            .order_by_and_limit_sql(&order_by, query.limit, query.offset);
        if !tail.is_empty() {
            sql.push(' ');
            sql.push_str(&tail);
        }
        sql
    }

    /// Quotes a select-list entry, keeping expressions and handling aliases.
    fn quote_select_column(&self, column: &str) -> String {
        static ALIAS: OnceLock<Regex> = OnceLock::new();
        if column.contains('(') {
            return column.to_string();
        }
        let quoter = self.quoter();
        let alias = ALIAS.get_or_init(|| {
            Regex::new(r"(?i)^(.*?)\s+(?:as\s+)?([\w\-_.]+)$").expect("static regex is valid")
        });
        match alias.captures(column) {
            Some(caps) => format!(
                "{} AS {}",
                quoter.quote_column_name(&caps[1]),
                quoter.quote_simple_column_name(&caps[2])
            ),
            None => quoter.quote_column_name(column),
        }
    }
}

/// Constraints (primary key first) whose columns are all in `columns`.
fn conflict_constraints(schema: Option<&TableSchema>, columns: &[String]) -> Vec<Vec<String>> {
    let Some(schema) = schema else {
        return Vec::new();
    };
    let mut constraints: Vec<Vec<String>> = Vec::new();
    for keys in schema.unique_key_sets() {
        if !keys.is_empty()
            && keys.iter().all(|k| columns.contains(k))
            && !constraints.iter().any(|c| c.as_slice() == keys)
        {
            constraints.push(keys.to_vec());
        }
    }
    constraints
}
