//! Errors of the live database layer.

/// Errors raised while talking to a database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query building or validation failed before anything was sent.
    #[error(transparent)]
    Core(#[from] keystone_core::Error),

    /// The database driver reported an error.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A statement that must return a row returned none.
    #[error("Statement returned no row: {0}")]
    NoRow(String),
}

impl Error {
    /// Returns true for permanent dialect limitations.
    #[must_use]
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_not_supported())
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;
