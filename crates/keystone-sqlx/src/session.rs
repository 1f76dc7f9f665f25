//! Database-backed session storage.
//!
//! Sessions live in one table with the columns `id`, `expire` (a unix
//! timestamp) and `data`.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use keystone_core::{ColumnValue, Condition, Params, Query};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Result;

/// Storage contract of a session backend.
pub trait SessionHandler {
    /// Prepares the storage.
    fn open(&self, save_path: &str, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Releases the storage.
    fn close(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Returns the data of session `id`, or an empty string when it is
    /// missing or expired.
    fn read(&self, id: &str) -> impl Future<Output = Result<String>> + Send;

    /// Stores `data` for session `id`.
    fn write(&self, id: &str, data: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes session `id`.
    fn destroy(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes expired sessions and returns how many were removed.
    ///
    /// Backends that store an expiry per session may ignore `max_lifetime`.
    fn gc(&self, max_lifetime: u64) -> impl Future<Output = Result<u64>> + Send;

    /// Whether the caller must issue a fresh session id before writing.
    fn is_regenerate_id(&self) -> bool;
}

/// Sessions stored through a [`Connection`].
///
/// In strict mode, reading an id with no live row (missing or expired)
/// marks it for regeneration: the caller should switch to a new id, and
/// writes to the rejected one are ignored.
#[derive(Debug)]
pub struct DbSession<'c> {
    db: &'c Connection,
    table: String,
    timeout: i64,
    strict: bool,
    forced_regenerate: Mutex<Option<String>>,
}

impl<'c> DbSession<'c> {
    /// Default session lifetime in seconds.
    pub const DEFAULT_TIMEOUT: i64 = 1440;

    #[must_use]
    pub fn new(db: &'c Connection) -> Self {
        Self {
            db,
            table: "{{%session}}".to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            strict: false,
            forced_regenerate: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Seconds a session stays valid after its last write.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    #[must_use]
    pub const fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the session table.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn create_table(&self) -> Result<()> {
        self.db
            .create_command("", Params::new())
            .create_table(
                &self.table,
                [
                    ("id", "VARCHAR(128) NOT NULL PRIMARY KEY"),
                    ("expire", "INTEGER"),
                    ("data", "TEXT"),
                ],
                None,
            )
            .execute()
            .await?;
        Ok(())
    }

    fn forced(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.forced_regenerate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionHandler for DbSession<'_> {
    async fn open(&self, _save_path: &str, _name: &str) -> Result<bool> {
        Ok(true)
    }

    async fn close(&self) -> Result<bool> {
        Ok(true)
    }

    async fn read(&self, id: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let query = Query::new()
            .select(["data"])
            .from(self.table.clone())
            .filter(Condition::eq("id", id).and(Condition::compare("expire", ">", now)));
        let mut params = Params::new();
        let sql = self.db.query_builder().build_select(&query, &mut params);
        let data = self.db.create_command(sql, params).query_scalar().await?;

        if let Some(data) = data.and_then(|v| v.to_text()) {
            return Ok(data);
        }
        if self.strict {
            debug!(session = %id, "Unknown or expired session id, forcing regeneration");
            *self.forced() = Some(id.to_string());
        }
        Ok(String::new())
    }

    async fn write(&self, id: &str, data: &str) -> Result<bool> {
        if self.strict && self.forced().as_deref() == Some(id) {
            warn!(session = %id, "Ignoring write to a session id awaiting regeneration");
            return Ok(true);
        }
        let expire = Utc::now().timestamp() + self.timeout;
        let row: Vec<(String, ColumnValue)> = vec![
            ("id".to_string(), id.into()),
            ("expire".to_string(), expire.into()),
            ("data".to_string(), data.into()),
        ];
        self.db
            .create_command("", Params::new())
            .upsert(&self.table, row, true)
            .await?
            .execute()
            .await?;
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> Result<bool> {
        self.db
            .create_command("", Params::new())
            .delete(&self.table, Some(&Condition::eq("id", id)))
            .execute()
            .await?;
        Ok(true)
    }

    async fn gc(&self, _max_lifetime: u64) -> Result<u64> {
        let now = Utc::now().timestamp();
        let removed = self
            .db
            .create_command("", Params::new())
            .delete(&self.table, Some(&Condition::compare("expire", "<", now)))
            .execute()
            .await?;
        debug!(removed, "Collected expired sessions");
        Ok(removed)
    }

    fn is_regenerate_id(&self) -> bool {
        self.forced().is_some()
    }
}
