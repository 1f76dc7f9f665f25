//! Migration operations.
//!
//! Each operation is a schema change rendered through the connection's
//! dialect, so one migration runs unchanged on every supported database.

use keystone_core::{ColumnType, ForeignKey, Params, QueryBuilder};
use keystone_sqlx::{Command, Connection};

/// A single migration operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOperation {
    /// Create a new table.
    CreateTable {
        /// Table name; `{{%name}}` applies the table prefix.
        name: String,
        /// Column names and types, in order.
        columns: Vec<(String, ColumnType)>,
        /// Text appended to the statement, e.g. a MySQL engine clause.
        options: Option<String>,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column type.
        column_type: ColumnType,
    },

    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Create an index.
    CreateIndex {
        /// Index name.
        name: String,
        /// Table name.
        table: String,
        /// Indexed columns.
        columns: Vec<String>,
        /// Whether the index is unique.
        unique: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Table name.
        table: String,
    },

    /// Add a named primary key constraint.
    AddPrimaryKey {
        /// Constraint name.
        name: String,
        /// Table name.
        table: String,
        /// Key columns.
        columns: Vec<String>,
    },

    /// Drop a primary key constraint.
    DropPrimaryKey {
        /// Constraint name.
        name: String,
        /// Table name.
        table: String,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Table the constraint is added to.
        table: String,
        /// The constraint.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Constraint name.
        name: String,
        /// Table name.
        table: String,
    },

    /// Run raw SQL.
    RunSql {
        /// SQL for forward migration.
        forward: String,
        /// SQL for backward migration (if reversible).
        backward: Option<String>,
    },
}

impl MigrationOperation {
    /// Creates a `CreateTable` operation.
    #[must_use]
    pub fn create_table<K, V>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = (K, V)>,
        options: Option<&str>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<ColumnType>,
    {
        Self::CreateTable {
            name: name.into(),
            columns: columns
                .into_iter()
                .map(|(name, column_type)| (name.into(), column_type.into()))
                .collect(),
            options: options.map(ToString::to_string),
        }
    }

    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::DropTable { name: name.into() }
    }

    #[must_use]
    pub fn add_column(
        table: impl Into<String>,
        column: impl Into<String>,
        column_type: impl Into<ColumnType>,
    ) -> Self {
        Self::AddColumn {
            table: table.into(),
            column: column.into(),
            column_type: column_type.into(),
        }
    }

    #[must_use]
    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    #[must_use]
    pub fn create_index<S: Into<String>>(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        unique: bool,
    ) -> Self {
        Self::CreateIndex {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique,
        }
    }

    #[must_use]
    pub fn drop_index(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::DropIndex {
            name: name.into(),
            table: table.into(),
        }
    }

    #[must_use]
    pub fn add_primary_key<S: Into<String>>(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::AddPrimaryKey {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn drop_primary_key(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::DropPrimaryKey {
            name: name.into(),
            table: table.into(),
        }
    }

    #[must_use]
    pub fn add_foreign_key(table: impl Into<String>, foreign_key: ForeignKey) -> Self {
        Self::AddForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    #[must_use]
    pub fn drop_foreign_key(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::DropForeignKey {
            name: name.into(),
            table: table.into(),
        }
    }

    /// Creates a `RunSql` operation.
    #[must_use]
    pub fn run_sql(forward: impl Into<String>, backward: Option<&str>) -> Self {
        Self::RunSql {
            forward: forward.into(),
            backward: backward.map(ToString::to_string),
        }
    }

    /// Returns the operation that undoes this one, if it can be derived.
    ///
    /// Dropping a table, column, index or constraint loses the definition
    /// and cannot be reversed.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable { name, .. } => Some(Self::drop_table(name.clone())),
            Self::AddColumn { table, column, .. } => {
                Some(Self::drop_column(table.clone(), column.clone()))
            }
            Self::CreateIndex { name, table, .. } => {
                Some(Self::drop_index(name.clone(), table.clone()))
            }
            Self::AddPrimaryKey { name, table, .. } => {
                Some(Self::drop_primary_key(name.clone(), table.clone()))
            }
            Self::AddForeignKey { table, foreign_key } => foreign_key
                .name
                .as_ref()
                .map(|name| Self::drop_foreign_key(name.clone(), table.clone())),
            Self::RunSql { backward, .. } => backward
                .as_ref()
                .map(|sql| Self::run_sql(sql.clone(), None)),
            Self::DropTable { .. }
            | Self::DropColumn { .. }
            | Self::DropIndex { .. }
            | Self::DropPrimaryKey { .. }
            | Self::DropForeignKey { .. } => None,
        }
    }

    /// Returns true if this operation can be reversed.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.reverse().is_some()
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("Create table '{name}'"),
            Self::DropTable { name } => format!("Drop table '{name}'"),
            Self::AddColumn { table, column, .. } => {
                format!("Add column '{column}' to table '{table}'")
            }
            Self::DropColumn { table, column } => {
                format!("Drop column '{column}' from table '{table}'")
            }
            Self::CreateIndex { name, table, .. } => {
                format!("Create index '{name}' on table '{table}'")
            }
            Self::DropIndex { name, table } => format!("Drop index '{name}' on table '{table}'"),
            Self::AddPrimaryKey { name, table, .. } => {
                format!("Add primary key '{name}' to table '{table}'")
            }
            Self::DropPrimaryKey { name, table } => {
                format!("Drop primary key '{name}' from table '{table}'")
            }
            Self::AddForeignKey { table, foreign_key } => format!(
                "Add foreign key '{}' to table '{table}'",
                foreign_key.name.as_deref().unwrap_or("(unnamed)")
            ),
            Self::DropForeignKey { name, table } => {
                format!("Drop foreign key '{name}' from table '{table}'")
            }
            Self::RunSql { .. } => "Run SQL".to_string(),
        }
    }

    /// Renders the SQL of this operation without a connection.
    ///
    /// `{{%table}}` and `[[column]]` tokens are resolved with the builder's
    /// table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] when the dialect cannot
    /// express the operation.
    pub fn render(&self, qb: &QueryBuilder<'_>) -> keystone_core::Result<String> {
        let sql = match self {
            Self::CreateTable {
                name,
                columns,
                options,
            } => qb.create_table(name, columns.iter().cloned(), options.as_deref()),
            Self::DropTable { name } => qb.drop_table(name),
            Self::AddColumn {
                table,
                column,
                column_type,
            } => qb.add_column(table, column, column_type.clone()),
            Self::DropColumn { table, column } => qb.drop_column(table, column),
            Self::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => qb.create_index(name, table, columns.as_slice(), *unique),
            Self::DropIndex { name, table } => qb.drop_index(name, table),
            Self::AddPrimaryKey {
                name,
                table,
                columns,
            } => qb.add_primary_key(name, table, columns.as_slice())?,
            Self::DropPrimaryKey { name, table } => qb.drop_primary_key(name, table)?,
            Self::AddForeignKey { table, foreign_key } => qb.add_foreign_key(table, foreign_key)?,
            Self::DropForeignKey { name, table } => qb.drop_foreign_key(name, table)?,
            Self::RunSql { forward, .. } => forward.clone(),
        };
        Ok(qb.quoter().quote_sql(&sql, qb.table_prefix()))
    }

    /// Renders this operation as a command on `db`.
    ///
    /// # Errors
    ///
    /// Returns [`keystone_core::Error::NotSupported`] when the dialect cannot
    /// express the operation, e.g. adding a primary key on SQLite.
    pub fn command<'c>(&self, db: &'c Connection) -> keystone_sqlx::Result<Command<'c>> {
        let command = db.create_command("", Params::new());
        let command = match self {
            Self::CreateTable {
                name,
                columns,
                options,
            } => command.create_table(name, columns.iter().cloned(), options.as_deref()),
            Self::DropTable { name } => command.drop_table(name),
            Self::AddColumn {
                table,
                column,
                column_type,
            } => command.add_column(table, column, column_type.clone()),
            Self::DropColumn { table, column } => command.drop_column(table, column),
            Self::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => command.create_index(name, table, columns.as_slice(), *unique),
            Self::DropIndex { name, table } => command.drop_index(name, table),
            Self::AddPrimaryKey {
                name,
                table,
                columns,
            } => command.add_primary_key(name, table, columns.as_slice())?,
            Self::DropPrimaryKey { name, table } => command.drop_primary_key(name, table)?,
            Self::AddForeignKey { table, foreign_key } => {
                command.add_foreign_key(table, foreign_key)?
            }
            Self::DropForeignKey { name, table } => command.drop_foreign_key(name, table)?,
            Self::RunSql { forward, .. } => command.set_sql(forward),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{DriverName, ForeignKeyAction};

    #[test]
    fn test_create_table_reverses_to_drop() {
        let op = MigrationOperation::create_table("{{%item}}", [("id", "pk")], None);
        assert_eq!(op.reverse(), Some(MigrationOperation::drop_table("{{%item}}")));
        assert!(op.is_reversible());
    }

    #[test]
    fn test_drops_are_not_reversible() {
        assert!(!MigrationOperation::drop_table("item").is_reversible());
        assert!(!MigrationOperation::drop_column("item", "name").is_reversible());
        assert!(!MigrationOperation::drop_index("idx", "item").is_reversible());
    }

    #[test]
    fn test_foreign_key_reverse_needs_a_name() {
        let named = ForeignKey::new(Some("fk_a_b"), ["b_id"], "b", ["id"])
            .on_delete(ForeignKeyAction::Cascade);
        let op = MigrationOperation::add_foreign_key("a", named);
        assert_eq!(
            op.reverse(),
            Some(MigrationOperation::drop_foreign_key("fk_a_b", "a"))
        );

        let unnamed = ForeignKey::new(None, ["b_id"], "b", ["id"]);
        assert!(!MigrationOperation::add_foreign_key("a", unnamed).is_reversible());
    }

    #[test]
    fn test_run_sql_reverse() {
        let op = MigrationOperation::run_sql("CREATE VIEW v AS SELECT 1", Some("DROP VIEW v"));
        assert_eq!(
            op.reverse(),
            Some(MigrationOperation::run_sql("DROP VIEW v", None))
        );
        assert!(!MigrationOperation::run_sql("SELECT 1", None).is_reversible());
    }

    #[test]
    fn test_render_without_connection() {
        let driver = DriverName::Pgsql.driver();
        let qb = QueryBuilder::new(driver).with_table_prefix("app_");
        let op = MigrationOperation::create_index("idx_item_name", "{{%item}}", ["name"], false);
        assert_eq!(
            op.render(&qb).unwrap(),
            r#"CREATE INDEX "idx_item_name" ON "app_item" ("name")"#
        );
    }

    #[test]
    fn test_render_unsupported_on_sqlite() {
        let qb = QueryBuilder::new(DriverName::Sqlite.driver());
        let op = MigrationOperation::add_primary_key("pk_item", "item", ["id"]);
        assert!(op.render(&qb).unwrap_err().is_not_supported());
    }

    #[test]
    fn test_description() {
        let op = MigrationOperation::create_index("idx_item_name", "item", ["name"], false);
        assert_eq!(op.description(), "Create index 'idx_item_name' on table 'item'");
    }
}
