//! Error types shared by every dialect.

/// Errors raised while quoting, building or validating SQL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The dialect has no construct for the requested operation.
    ///
    /// This is a structural limitation of the database, never a transient
    /// condition.
    #[error("{operation} is not supported by {dialect}.")]
    NotSupported {
        /// The operation that was requested.
        operation: String,
        /// The dialect that rejected it.
        dialect: &'static str,
    },

    /// A caller-supplied value violates a documented precondition.
    #[error("{0}")]
    InvalidArgument(String),

    /// The connection configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Creates a [`Error::NotSupported`] for `operation` on `dialect`.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>, dialect: &'static str) -> Self {
        Self::NotSupported {
            operation: operation.into(),
            dialect,
        }
    }

    /// Creates an [`Error::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true for permanent dialect limitations.
    #[must_use]
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

/// Result type for query building operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_supported_message_names_operation_and_dialect() {
        let err = Error::not_supported("create_sequence", "mysql");
        assert_eq!(err.to_string(), "create_sequence is not supported by mysql.");
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_invalid_argument_message_is_verbatim() {
        let err = Error::invalid_argument("The value must be greater than '0'.");
        assert_eq!(err.to_string(), "The value must be greater than '0'.");
        assert!(!err.is_not_supported());
    }
}
