//! Table metadata.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::column::{ColumnSchema, ForeignKeyAction};
use crate::error::{Error, Result};

/// A foreign key relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name, when the catalog exposes one.
    pub name: Option<String>,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub foreign_table: String,
    /// Referenced columns, in the same order as `columns`.
    pub foreign_columns: Vec<String>,
    /// ON DELETE action.
    pub on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKey {
    /// Creates a foreign key without referential actions.
    #[must_use]
    pub fn new<S: Into<String>>(
        name: Option<&str>,
        columns: impl IntoIterator<Item = S>,
        foreign_table: impl Into<String>,
        foreign_columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.map(ToString::to_string),
            columns: columns.into_iter().map(Into::into).collect(),
            foreign_table: foreign_table.into(),
            foreign_columns: foreign_columns.into_iter().map(Into::into).collect(),
            on_delete: None,
            on_update: None,
        }
    }

    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// A unique constraint or unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint or index name.
    pub name: String,
    /// Covered columns.
    pub columns: Vec<String>,
}

/// Sequence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub name: String,
    pub start: Option<i64>,
    pub increment: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cycle: bool,
}

/// Metadata of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema the table lives in, if not the default one.
    pub schema_name: Option<String>,
    /// Unqualified table name.
    pub name: String,
    /// Qualified name (`schema.table`, or just `table`).
    pub full_name: String,
    /// Columns in catalog order.
    pub columns: Vec<ColumnSchema>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Unique constraints other than the primary key.
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Sequence backing the auto-increment column, if any.
    pub sequence_name: Option<String>,
}

impl TableSchema {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new(schema_name: Option<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let full_name = match schema_name {
            Some(ref schema) => format!("{schema}.{name}"),
            None => name.clone(),
        };
        Self {
            schema_name,
            name,
            full_name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            sequence_name: None,
        }
    }

    /// Appends a column, builder style. Primary key columns are also
    /// recorded in [`TableSchema::primary_key`].
    #[must_use]
    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        if column.is_primary_key && !self.primary_key.contains(&column.name) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    /// Adds a unique constraint, builder style.
    #[must_use]
    pub fn with_unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.unique_constraints.push(UniqueConstraint {
            name: name.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Looks a column up by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the column names in catalog order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns the primary key columns.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.primary_key.iter().filter_map(|name| self.column(name))
    }

    /// Returns the auto-increment column, if any.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Returns the primary key followed by every unique constraint.
    #[must_use]
    pub fn unique_key_sets(&self) -> Vec<&[String]> {
        let mut sets: Vec<&[String]> = Vec::with_capacity(self.unique_constraints.len() + 1);
        if !self.primary_key.is_empty() {
            sets.push(&self.primary_key);
        }
        sets.extend(self.unique_constraints.iter().map(|u| u.columns.as_slice()));
        sets
    }

    /// Checks the descriptor's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when a primary key column is not
    /// among the columns, or a sequence is recorded without an
    /// auto-increment column.
    pub fn validate(&self) -> Result<()> {
        if let Some(missing) = self.primary_key.iter().find(|pk| self.column(pk).is_none()) {
            return Err(Error::invalid_argument(format!(
                "Primary key column '{missing}' does not exist in table '{}'.",
                self.full_name
            )));
        }
        for column in &self.columns {
            if column.sequence_name.is_some() && !column.auto_increment {
                return Err(Error::invalid_argument(format!(
                    "Column '{}' of table '{}' has a sequence but is not auto-increment.",
                    column.name, self.full_name
                )));
            }
        }
        if self.sequence_name.is_some() && self.auto_increment_column().is_none() {
            return Err(Error::invalid_argument(format!(
                "Table '{}' has a sequence but no auto-increment column.",
                self.full_name
            )));
        }
        Ok(())
    }
}

/// Lookup of already-loaded table metadata by raw table name.
///
/// The query builder consults this for column typing, primary keys and
/// unique constraints. Names are matched against both the plain and the
/// qualified table name.
pub trait SchemaSource {
    /// Returns the descriptor of `name`, if known.
    fn table_schema(&self, name: &str) -> Option<&TableSchema>;
}

/// A source that knows no tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchema;

impl SchemaSource for NoSchema {
    fn table_schema(&self, _name: &str) -> Option<&TableSchema> {
        None
    }
}

impl SchemaSource for TableSchema {
    fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        (self.name == name || self.full_name == name).then_some(self)
    }
}

impl SchemaSource for Arc<TableSchema> {
    fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.as_ref().table_schema(name)
    }
}

impl<S: SchemaSource> SchemaSource for [S] {
    fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.iter().find_map(|s| s.table_schema(name))
    }
}

impl<S: SchemaSource> SchemaSource for Vec<S> {
    fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.as_slice().table_schema(name)
    }
}

impl<S: SchemaSource> SchemaSource for HashMap<String, S> {
    fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.get(name).and_then(|s| s.table_schema(name)).or_else(|| {
            self.values().find_map(|s| s.table_schema(name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::types;

    fn customer() -> TableSchema {
        let mut id = ColumnSchema::new("id", types::PK, "integer");
        id.is_primary_key = true;
        id.auto_increment = true;
        TableSchema::new(None, "customer")
            .with_column(id)
            .with_column(ColumnSchema::new("email", types::STRING, "varchar(128)"))
            .with_unique("uq_customer_email", &["email"])
    }

    #[test]
    fn test_with_column_collects_primary_key() {
        let table = customer();
        assert_eq!(table.primary_key, vec!["id".to_string()]);
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["id", "email"]);
        assert_eq!(table.auto_increment_column().map(|c| c.name.as_str()), Some("id"));
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_unique_key_sets_start_with_primary_key() {
        let table = customer();
        let sets = table.unique_key_sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0], ["id".to_string()]);
        assert_eq!(sets[1], ["email".to_string()]);
    }

    #[test]
    fn test_validate_rejects_unknown_primary_key() {
        let mut table = customer();
        table.primary_key.push("missing".into());
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_validate_rejects_sequence_without_auto_increment() {
        let mut table = TableSchema::new(Some("public".into()), "tag")
            .with_column(ColumnSchema::new("name", types::STRING, "varchar"));
        table.sequence_name = Some("tag_id_seq".into());
        assert!(table.validate().is_err());
        assert_eq!(table.full_name, "public.tag");
    }

    #[test]
    fn test_schema_source_lookup() {
        let mut tables = HashMap::new();
        tables.insert("customer".to_string(), customer());
        assert!(tables.table_schema("customer").is_some());
        assert!(tables.table_schema("order").is_none());
        assert!(NoSchema.table_schema("customer").is_none());
    }
}
