//! Dialect-aware schema migrations for keystone.
//!
//! A migration is a list of [`MigrationOperation`]s rendered through the
//! connection's dialect, so the same migration runs on SQLite, MySQL,
//! PostgreSQL, SQL Server and Oracle. Applied migrations are recorded in
//! the `{{%migration}}` table.
//!
//! - **Operations** - schema changes like `CreateTable`, `AddForeignKey`, `CreateIndex`
//! - **Executor** - applies and rolls back migrations, tracking history
//! - **i18n** - the bootstrap migration of the translation message tables
//!
//! # Example
//!
//! ```rust,no_run
//! use keystone_migrate::prelude::*;
//! use keystone_sqlx::{Connection, ConnectionConfig};
//!
//! # async fn run() -> keystone_migrate::error::Result<()> {
//! let db = Connection::open(ConnectionConfig::new("sqlite:app.db?mode=rwc")).await?;
//! let executor = MigrationExecutor::new(&db);
//! executor.init().await?;
//! executor.apply_all(&i18n::migrations(db.driver_name())).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending migrations
//! keystone-migrate --database sqlite:app.db up
//!
//! # Roll back the last migration
//! keystone-migrate down
//!
//! # Print the PostgreSQL DDL without connecting
//! keystone-migrate sql --driver pgsql
//! ```

pub mod error;
pub mod executor;
pub mod history;
pub mod i18n;
pub mod operations;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{ExecutableMigration, MigrationExecutor};
    pub use crate::history::{AppliedMigration, MigrationHistory};
    pub use crate::i18n;
    pub use crate::operations::MigrationOperation;
}
