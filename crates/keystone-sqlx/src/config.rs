//! Connection configuration.

use std::time::Duration;

use keystone_core::{DriverName, Error as CoreError};
use serde::Deserialize;

use crate::error::Result;

/// Settings of one database connection.
///
/// ```rust
/// use keystone_sqlx::ConnectionConfig;
///
/// let config = ConnectionConfig::from_json(
///     r#"{"dsn": "sqlite::memory:", "table_prefix": "tbl_", "enable_schema_cache": true}"#,
/// )
/// .unwrap();
/// assert_eq!(config.table_prefix, "tbl_");
/// assert_eq!(config.schema_cache_duration, 3600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Data source name, e.g. `sqlite::memory:` or `postgres://localhost/app`.
    pub dsn: String,
    /// Substituted for `%` in `{{%table}}` names.
    pub table_prefix: String,
    /// Stores loaded table metadata in the shared cache.
    pub enable_schema_cache: bool,
    /// Lifetime of cached table metadata in seconds; 0 never expires.
    pub schema_cache_duration: u64,
    /// Tables whose metadata is never put in the shared cache.
    pub schema_cache_exclude: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            table_prefix: String::new(),
            enable_schema_cache: false,
            schema_cache_duration: 3600,
            schema_cache_exclude: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    /// Creates a configuration for `dsn` with default settings.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Enables the shared schema cache with the given lifetime in seconds.
    #[must_use]
    pub const fn with_schema_cache(mut self, duration: u64) -> Self {
        self.enable_schema_cache = true;
        self.schema_cache_duration = duration;
        self
    }

    /// Returns the driver named by the DSN prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] when the DSN has no prefix or
    /// names an unknown driver.
    pub fn driver_name(&self) -> Result<DriverName> {
        let prefix = self
            .dsn
            .split_once(':')
            .map(|(prefix, _)| prefix)
            .filter(|prefix| !prefix.is_empty())
            .ok_or_else(|| {
                CoreError::InvalidConfig(format!("DSN '{}' has no driver prefix.", self.dsn))
            })?;
        Ok(DriverName::from_name(prefix)?)
    }

    /// Returns the URL handed to sqlx.
    ///
    /// The `pgsql` prefix is rewritten to the `postgres` scheme sqlx knows.
    #[must_use]
    pub fn connect_url(&self) -> String {
        match self.dsn.strip_prefix("pgsql:") {
            Some(rest) => format!("postgres:{rest}"),
            None => self.dsn.clone(),
        }
    }

    /// Returns the schema cache lifetime, `None` meaning no expiry.
    #[must_use]
    pub const fn schema_cache_ttl(&self) -> Option<Duration> {
        match self.schema_cache_duration {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        }
    }

    /// Returns true when metadata of `table` may go to the shared cache.
    #[must_use]
    pub fn is_schema_cacheable(&self, table: &str) -> bool {
        self.enable_schema_cache && !self.schema_cache_exclude.iter().any(|t| t == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_name_from_dsn_prefix() {
        let cases = [
            ("sqlite::memory:", DriverName::Sqlite),
            ("mysql://root@localhost/app", DriverName::Mysql),
            ("pgsql://localhost/app", DriverName::Pgsql),
            ("postgres://localhost/app", DriverName::Pgsql),
            ("sqlsrv:Server=localhost", DriverName::Sqlsrv),
            ("oci:dbname=//localhost/XE", DriverName::Oci),
        ];
        for (dsn, expected) in cases {
            assert_eq!(ConnectionConfig::new(dsn).driver_name().unwrap(), expected, "{dsn}");
        }
    }

    #[test]
    fn test_dsn_without_prefix_is_invalid() {
        let err = ConnectionConfig::new("localhost").driver_name().unwrap_err();
        assert!(err.to_string().contains("no driver prefix"));
        assert!(ConnectionConfig::new("foo:bar").driver_name().is_err());
    }

    #[test]
    fn test_pgsql_prefix_is_rewritten_for_sqlx() {
        let config = ConnectionConfig::new("pgsql://u@localhost/app");
        assert_eq!(config.connect_url(), "postgres://u@localhost/app");
    }

    #[test]
    fn test_schema_cache_settings() {
        let mut config = ConnectionConfig::new("sqlite::memory:").with_schema_cache(0);
        config.schema_cache_exclude.push("session".into());
        assert_eq!(config.schema_cache_ttl(), None);
        assert!(config.is_schema_cacheable("customer"));
        assert!(!config.is_schema_cacheable("session"));
        assert!(!ConnectionConfig::new("sqlite::memory:").is_schema_cacheable("customer"));
    }

    #[test]
    fn test_from_json_rejects_malformed_input() {
        assert!(ConnectionConfig::from_json("{").is_err());
    }
}
