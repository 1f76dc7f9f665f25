//! Migration executor.
//!
//! Applies and rolls back migrations against a [`Connection`], recording
//! each step in the migration history.

use keystone_sqlx::Connection;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::history::MigrationHistory;
use crate::operations::MigrationOperation;

/// A migration ready to be executed.
#[derive(Debug, Clone)]
pub struct ExecutableMigration {
    /// Application/module name.
    pub app: String,
    /// Migration name.
    pub name: String,
    /// Migration operations.
    pub operations: Vec<MigrationOperation>,
    /// Dependencies (app/name pairs).
    pub dependencies: Vec<(String, String)>,
}

impl ExecutableMigration {
    /// Creates a new executable migration.
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            operations: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Adds an operation to this migration.
    #[must_use]
    pub fn operation(mut self, op: MigrationOperation) -> Self {
        self.operations.push(op);
        self
    }

    /// Adds operations to this migration.
    #[must_use]
    pub fn operations(mut self, ops: impl IntoIterator<Item = MigrationOperation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, app: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push((app.into(), name.into()));
        self
    }

    /// Returns the full migration identifier.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.app, self.name)
    }

    /// Returns whether this migration is reversible.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.operations.iter().all(MigrationOperation::is_reversible)
    }

    /// Returns the reverse operations for rollback, last operation first.
    #[must_use]
    pub fn reverse_operations(&self) -> Option<Vec<MigrationOperation>> {
        self.operations
            .iter()
            .rev()
            .map(MigrationOperation::reverse)
            .collect()
    }
}

/// Executes migrations against a database.
#[derive(Debug)]
pub struct MigrationExecutor<'c> {
    db: &'c Connection,
    history: MigrationHistory<'c>,
    dry_run: bool,
}

impl<'c> MigrationExecutor<'c> {
    /// Creates a new migration executor.
    #[must_use]
    pub const fn new(db: &'c Connection) -> Self {
        Self {
            db,
            history: MigrationHistory::new(db),
            dry_run: false,
        }
    }

    /// Records history in `history` instead of the default table.
    #[must_use]
    pub const fn with_history(mut self, history: MigrationHistory<'c>) -> Self {
        self.history = history;
        self
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Ensures the migrations history table exists.
    pub async fn init(&self) -> Result<()> {
        if !self.dry_run {
            self.history.ensure_table().await?;
        }
        Ok(())
    }

    /// Returns the migration history.
    #[must_use]
    pub const fn history(&self) -> &MigrationHistory<'c> {
        &self.history
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, app: &str, name: &str) -> Result<bool> {
        self.history.is_applied(app, name).await
    }

    /// Applies a single migration.
    ///
    /// An already applied migration is skipped. Dependencies must have been
    /// applied first.
    pub async fn apply(&self, migration: &ExecutableMigration) -> Result<()> {
        info!(
            app = %migration.app,
            name = %migration.name,
            "Applying migration"
        );

        if !self.dry_run {
            if self
                .history
                .is_applied(&migration.app, &migration.name)
                .await?
            {
                warn!(
                    app = %migration.app,
                    name = %migration.name,
                    "Migration already applied, skipping"
                );
                return Ok(());
            }

            for (dep_app, dep_name) in &migration.dependencies {
                if !self.history.is_applied(dep_app, dep_name).await? {
                    return Err(MigrateError::MissingDependency {
                        migration: migration.id(),
                        dependency: format!("{dep_app}/{dep_name}"),
                    });
                }
            }
        }

        self.run(&migration.operations).await?;

        if !self.dry_run {
            self.history
                .record_applied(&migration.app, &migration.name)
                .await?;
        }

        info!(
            app = %migration.app,
            name = %migration.name,
            "Migration applied successfully"
        );

        Ok(())
    }

    /// Rolls back a single migration.
    pub async fn rollback(&self, migration: &ExecutableMigration) -> Result<()> {
        info!(
            app = %migration.app,
            name = %migration.name,
            "Rolling back migration"
        );

        if !self.dry_run
            && !self
                .history
                .is_applied(&migration.app, &migration.name)
                .await?
        {
            warn!(
                app = %migration.app,
                name = %migration.name,
                "Migration not applied, skipping rollback"
            );
            return Ok(());
        }

        let reverse_ops = migration
            .reverse_operations()
            .ok_or_else(|| MigrateError::NotReversible(migration.id()))?;

        self.run(&reverse_ops).await?;

        if !self.dry_run {
            self.history
                .record_unapplied(&migration.app, &migration.name)
                .await?;
        }

        info!(
            app = %migration.app,
            name = %migration.name,
            "Migration rolled back successfully"
        );

        Ok(())
    }

    async fn run(&self, operations: &[MigrationOperation]) -> Result<()> {
        for operation in operations {
            let command = operation.command(self.db)?;
            if self.dry_run {
                println!("{};", command.sql());
                continue;
            }
            debug!(operation = %operation.description(), "Running operation");
            command.execute().await?;
        }
        Ok(())
    }

    /// Applies multiple migrations in order.
    pub async fn apply_all(&self, migrations: &[ExecutableMigration]) -> Result<()> {
        for migration in migrations {
            self.apply(migration).await?;
        }
        Ok(())
    }

    /// Rolls back multiple migrations in reverse order.
    pub async fn rollback_all(&self, migrations: &[ExecutableMigration]) -> Result<()> {
        for migration in migrations.iter().rev() {
            self.rollback(migration).await?;
        }
        Ok(())
    }

    /// Returns pending migrations (not yet applied).
    pub async fn pending<'a>(
        &self,
        migrations: &'a [ExecutableMigration],
    ) -> Result<Vec<&'a ExecutableMigration>> {
        let applied = self.history.get_applied_set().await?;
        Ok(migrations
            .iter()
            .filter(|m| !applied.contains(&(m.app.clone(), m.name.clone())))
            .collect())
    }

    /// Renders the SQL of a migration without executing it.
    ///
    /// # Errors
    ///
    /// Returns the error of an operation the dialect cannot express.
    pub fn sql_for(&self, migration: &ExecutableMigration) -> Result<Vec<String>> {
        render(self.db, &migration.operations)
    }

    /// Renders the rollback SQL of a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::NotReversible`] when an operation cannot be
    /// undone.
    pub fn rollback_sql_for(&self, migration: &ExecutableMigration) -> Result<Vec<String>> {
        let reverse_ops = migration
            .reverse_operations()
            .ok_or_else(|| MigrateError::NotReversible(migration.id()))?;
        render(self.db, &reverse_ops)
    }
}

fn render(db: &Connection, operations: &[MigrationOperation]) -> Result<Vec<String>> {
    operations
        .iter()
        .map(|op| -> Result<String> { Ok(op.command(db)?.sql().to_string()) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::column_builder::{primary_key, string};
    use keystone_core::Params;
    use keystone_sqlx::ConnectionConfig;

    async fn create_test_connection() -> Connection {
        Connection::open(ConnectionConfig::new("sqlite::memory:"))
            .await
            .expect("Failed to open in-memory SQLite")
    }

    async fn table_exists(db: &Connection, name: &str) -> bool {
        db.create_command(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=:name",
            Params::new().with("name", name),
        )
        .query_one()
        .await
        .unwrap()
        .is_some()
    }

    fn create_users_migration() -> ExecutableMigration {
        ExecutableMigration::new("users", "0001_initial").operation(
            MigrationOperation::create_table(
                "users",
                [("id", primary_key()), ("username", string().not_null())],
                None,
            ),
        )
    }

    fn add_email_migration() -> ExecutableMigration {
        ExecutableMigration::new("users", "0002_add_email")
            .depends_on("users", "0001_initial")
            .operation(MigrationOperation::add_column("users", "email", string()))
    }

    #[tokio::test]
    async fn test_apply_migration() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        executor.apply(&create_users_migration()).await.unwrap();

        assert!(table_exists(&db, "users").await);
        assert!(executor.is_applied("users", "0001_initial").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_idempotent() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        let migration = create_users_migration();
        executor.apply(&migration).await.unwrap();
        executor.apply(&migration).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_with_dependency() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        executor.apply(&create_users_migration()).await.unwrap();
        executor.apply(&add_email_migration()).await.unwrap();

        assert!(executor.is_applied("users", "0002_add_email").await.unwrap());
        let users = db.schema().get_table_schema("users", false).await.unwrap().unwrap();
        assert!(users.column("email").is_some());
    }

    #[tokio::test]
    async fn test_apply_missing_dependency() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        let result = executor.apply(&add_email_migration()).await;
        assert!(matches!(
            result,
            Err(MigrateError::MissingDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_rollback_migration() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        let migration = create_users_migration();
        executor.apply(&migration).await.unwrap();
        executor.rollback(&migration).await.unwrap();

        assert!(!table_exists(&db, "users").await);
        assert!(!executor.is_applied("users", "0001_initial").await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_irreversible_migration() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        let migration = ExecutableMigration::new("users", "0003_drop")
            .operation(MigrationOperation::run_sql("CREATE TABLE t (id INTEGER)", None));
        executor.apply(&migration).await.unwrap();
        let result = executor.rollback(&migration).await;
        assert!(matches!(result, Err(MigrateError::NotReversible(_))));
    }

    #[tokio::test]
    async fn test_pending_migrations() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);
        executor.init().await.unwrap();

        let migrations = vec![create_users_migration(), add_email_migration()];
        assert_eq!(executor.pending(&migrations).await.unwrap().len(), 2);

        executor.apply(&migrations[0]).await.unwrap();
        let pending = executor.pending(&migrations).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "0002_add_email");
    }

    #[tokio::test]
    async fn test_sql_generation() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db);

        let sql = executor.sql_for(&create_users_migration()).unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("CREATE TABLE `users`"));

        let rollback = executor.rollback_sql_for(&create_users_migration()).unwrap();
        assert_eq!(rollback, vec!["DROP TABLE `users`".to_string()]);
    }

    #[tokio::test]
    async fn test_dry_run() {
        let db = create_test_connection().await;
        let executor = MigrationExecutor::new(&db).dry_run(true);

        executor.apply(&create_users_migration()).await.unwrap();

        assert!(!table_exists(&db, "users").await);
    }
}
