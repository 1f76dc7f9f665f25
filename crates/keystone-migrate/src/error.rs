//! Error types for the migration system.

/// Errors that can occur while applying or rolling back migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A migration depends on another that has not been applied.
    #[error("Migration '{migration}' depends on '{dependency}' which has not been applied")]
    MissingDependency {
        /// The migration with the missing dependency.
        migration: String,
        /// The dependency that's missing.
        dependency: String,
    },

    /// A migration is not reversible.
    #[error("Migration '{0}' is not reversible")]
    NotReversible(String),

    /// Migration not found.
    #[error("Migration not found: {app}/{name}")]
    MigrationNotFound {
        /// Application name.
        app: String,
        /// Migration name.
        name: String,
    },

    /// Database or query building error during migration execution.
    #[error("Database error: {0}")]
    Db(#[from] keystone_sqlx::Error),
}

impl From<keystone_core::Error> for MigrateError {
    fn from(err: keystone_core::Error) -> Self {
        Self::Db(err.into())
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
