//! Schema-changing statements.

use super::QueryBuilder;
use crate::column_builder::ColumnType;
use crate::dialect::SequenceOptions;
use crate::error::{Error, Result};
use crate::table::ForeignKey;

fn owned_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    columns.iter().map(|c| c.as_ref().to_string()).collect()
}

impl QueryBuilder<'_> {
    /// Renders `CREATE TABLE`.
    ///
    /// Entries with an empty name are emitted as raw lines, e.g. table
    /// constraints.
    pub fn create_table<K, V>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = (K, V)>,
        options: Option<&str>,
    ) -> String
    where
        K: AsRef<str>,
        V: Into<ColumnType>,
    {
        let columns: Vec<(String, String)> = columns
            .into_iter()
            .map(|(name, column_type)| {
                let name = name.as_ref().to_string();
                let definition = if name.is_empty() {
                    column_type.into().to_abstract(self.driver)
                } else {
                    self.get_column_type(column_type)
                };
                (name, definition)
            })
            .collect();
        self.driver.create_table_sql(table, &columns, options)
    }

    #[must_use]
    pub fn drop_table(&self, table: &str) -> String {
        self.driver.drop_table_sql(table)
    }

    #[must_use]
    pub fn rename_table(&self, old_name: &str, new_name: &str) -> String {
        self.driver.rename_table_sql(old_name, new_name)
    }

    #[must_use]
    pub fn truncate_table(&self, table: &str) -> String {
        self.driver.truncate_table_sql(table)
    }

    #[must_use]
    pub fn add_column(&self, table: &str, column: &str, column_type: impl Into<ColumnType>) -> String {
        self.driver
            .add_column_sql(table, column, &self.get_column_type(column_type))
    }

    #[must_use]
    pub fn drop_column(&self, table: &str, column: &str) -> String {
        self.driver.drop_column_sql(table, column)
    }

    #[must_use]
    pub fn rename_column(&self, table: &str, old_name: &str, new_name: &str) -> String {
        self.driver.rename_column_sql(table, old_name, new_name)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where columns cannot be altered.
    pub fn alter_column(
        &self,
        table: &str,
        column: &str,
        column_type: impl Into<ColumnType>,
    ) -> Result<String> {
        self.driver
            .alter_column_sql(table, column, &self.get_column_type(column_type))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where keys cannot be added later.
    pub fn add_primary_key<S: AsRef<str>>(
        &self,
        name: &str,
        table: &str,
        columns: &[S],
    ) -> Result<String> {
        self.driver
            .add_primary_key_sql(name, table, &owned_columns(columns))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where keys cannot be dropped.
    pub fn drop_primary_key(&self, name: &str, table: &str) -> Result<String> {
        self.driver.drop_primary_key_sql(name, table)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where foreign keys cannot be added
    /// later, or an action is unavailable on the dialect.
    pub fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<String> {
        self.driver.add_foreign_key_sql(table, foreign_key)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where foreign keys cannot be dropped.
    pub fn drop_foreign_key(&self, name: &str, table: &str) -> Result<String> {
        self.driver.drop_foreign_key_sql(name, table)
    }

    #[must_use]
    pub fn create_index<S: AsRef<str>>(
        &self,
        name: &str,
        table: &str,
        columns: &[S],
        unique: bool,
    ) -> String {
        self.driver
            .create_index_sql(name, table, &owned_columns(columns), unique)
    }

    #[must_use]
    pub fn drop_index(&self, name: &str, table: &str) -> String {
        self.driver.drop_index_sql(name, table)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] where unique constraints cannot be
    /// added later.
    pub fn add_unique<S: AsRef<str>>(&self, name: &str, table: &str, columns: &[S]) -> Result<String> {
        self.driver.add_unique_sql(name, table, &owned_columns(columns))
    }

    #[must_use]
    pub fn drop_unique(&self, name: &str, table: &str) -> String {
        self.driver.drop_unique_sql(name, table)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    pub fn create_sequence(
        &self,
        name: &str,
        start: i64,
        increment: i64,
        options: &SequenceOptions,
    ) -> Result<String> {
        self.driver.create_sequence_sql(name, start, increment, options)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    pub fn drop_sequence(&self, name: &str) -> Result<String> {
        self.driver.drop_sequence_sql(name)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without sequence objects.
    pub fn reset_sequence(&self, name: &str, value: i64) -> Result<String> {
        self.driver.reset_sequence_sql(name, value)
    }

    /// Renders the statement(s) making `value` the next generated key of
    /// `table`'s auto-increment primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `value` is not positive, the
    /// table is unknown, or its primary key is not a single auto-increment
    /// column.
    pub fn reset_auto_increment(&self, table: &str, value: i64) -> Result<String> {
        if value <= 0 {
            return Err(Error::invalid_argument("The value must be greater than '0'."));
        }
        let raw = self.raw_table_name(table);
        let schema = self
            .table_schema(table)
            .ok_or_else(|| Error::invalid_argument(format!("Table not found: '{raw}'.")))?;
        let column = match schema.primary_key.as_slice() {
            [] => {
                return Err(Error::invalid_argument(format!(
                    "Table '{raw}' has no primary key."
                )))
            }
            [single] => schema.column(single).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Primary key column '{single}' does not exist in table '{raw}'."
                ))
            })?,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "Table '{raw}' has a composite primary key."
                )))
            }
        };
        if !column.auto_increment {
            return Err(Error::invalid_argument(format!(
                "Primary key '{}' of table '{raw}' is not auto-increment.",
                column.name
            )));
        }
        self.driver.reset_auto_increment_sql(schema, column, value)
    }

    /// Renders the query reading the last generated key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the dialect needs a sequence
    /// name and none was given.
    pub fn last_insert_id(&self, sequence: Option<&str>) -> Result<String> {
        self.driver.last_insert_id_sql(sequence)
    }
}
