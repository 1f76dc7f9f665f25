//! A live database connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use keystone_core::{
    Cache, DialectDriver, DriverName, Error as CoreError, Params, QueryBuilder, Quoter,
    TableSchema,
};
use sqlx::AnyConnection;
use sqlx::{Connection as _, Executor as _};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::schema::Schema;

/// One physical database handle plus its dialect and schema state.
///
/// Access to the handle is serialized behind an async mutex, so a
/// connection can be shared by reference between tasks.
pub struct Connection {
    config: ConnectionConfig,
    driver_name: DriverName,
    handle: Mutex<AnyConnection>,
    transaction_level: AtomicUsize,
    pub(crate) tables: RwLock<HashMap<String, Arc<TableSchema>>>,
    cache: Option<Arc<dyn Cache>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.driver_name)
            .field("table_prefix", &self.config.table_prefix)
            .field("transaction_level", &self.transaction_level())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a connection, selecting the dialect from the DSN prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an unknown driver or one
    /// with no bundled runtime driver (SQL Server, Oracle), and the driver
    /// error when connecting fails.
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        let driver_name = config.driver_name()?;
        if matches!(driver_name, DriverName::Sqlsrv | DriverName::Oci) {
            return Err(CoreError::InvalidConfig(format!(
                "No runtime driver is bundled for '{driver_name}'."
            ))
            .into());
        }

        sqlx::any::install_default_drivers();
        let handle = AnyConnection::connect(&config.connect_url()).await?;
        info!(driver = %driver_name, "Opened database connection");

        Ok(Self {
            config,
            driver_name,
            handle: Mutex::new(handle),
            transaction_level: AtomicUsize::new(0),
            tables: RwLock::new(HashMap::new()),
            cache: None,
        })
    }

    /// Uses `cache` for table metadata when the configuration enables it.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Closes the physical handle.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the handle does not close cleanly.
    pub async fn close(self) -> Result<()> {
        self.handle.into_inner().close().await?;
        info!(driver = %self.driver_name, "Closed database connection");
        Ok(())
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub const fn driver_name(&self) -> DriverName {
        self.driver_name
    }

    #[must_use]
    pub fn driver(&self) -> &'static dyn DialectDriver {
        self.driver_name.driver()
    }

    #[must_use]
    pub fn quoter(&self) -> &'static Quoter {
        self.driver().quoter()
    }

    #[must_use]
    pub fn table_prefix(&self) -> &str {
        &self.config.table_prefix
    }

    /// The shared cache, if one was attached.
    #[must_use]
    pub fn cache(&self) -> Option<&dyn Cache> {
        self.cache.as_deref()
    }

    /// A query builder for this dialect and table prefix.
    ///
    /// It knows no table metadata; commands attach it when rendering.
    #[must_use]
    pub fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self.driver()).with_table_prefix(&self.config.table_prefix)
    }

    /// Schema introspection for this connection.
    #[must_use]
    pub const fn schema(&self) -> Schema<'_> {
        Schema::new(self)
    }

    /// Creates a command for `sql`.
    ///
    /// `{{table}}` and `[[column]]` tokens in `sql` are quoted.
    #[must_use]
    pub fn create_command(&self, sql: impl AsRef<str>, params: Params) -> Command<'_> {
        Command::new(self, sql.as_ref(), params)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, AnyConnection> {
        self.handle.lock().await
    }

    /// Number of open transactions; savepoints count as nested levels.
    #[must_use]
    pub fn transaction_level(&self) -> usize {
        self.transaction_level.load(Ordering::SeqCst)
    }

    /// Starts a transaction, or a savepoint when one is already active.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn begin_transaction(&self) -> Result<()> {
        let mut handle = self.lock().await;
        let level = self.transaction_level();
        let sql = if level == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT LEVEL{level}")
        };
        control(&mut handle, &sql).await?;
        self.transaction_level.store(level + 1, Ordering::SeqCst);
        info!(level = level + 1, "Transaction started");
        Ok(())
    }

    /// Commits the innermost transaction level.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] without an active transaction,
    /// or the driver error.
    pub async fn commit(&self) -> Result<()> {
        let mut handle = self.lock().await;
        let level = self.active_level()?;
        let sql = if level == 1 {
            "COMMIT".to_string()
        } else {
            format!("RELEASE SAVEPOINT LEVEL{}", level - 1)
        };
        control(&mut handle, &sql).await?;
        self.transaction_level.store(level - 1, Ordering::SeqCst);
        info!(level, "Transaction committed");
        Ok(())
    }

    /// Rolls back the innermost transaction level.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] without an active transaction,
    /// or the driver error.
    pub async fn roll_back(&self) -> Result<()> {
        let mut handle = self.lock().await;
        let level = self.active_level()?;
        let sql = if level == 1 {
            "ROLLBACK".to_string()
        } else {
            format!("ROLLBACK TO SAVEPOINT LEVEL{}", level - 1)
        };
        // The level drops even when the driver fails.
        self.transaction_level.store(level - 1, Ordering::SeqCst);
        control(&mut handle, &sql).await?;
        info!(level, "Transaction rolled back");
        Ok(())
    }

    fn active_level(&self) -> Result<usize> {
        match self.transaction_level() {
            0 => Err(CoreError::invalid_argument("No transaction is active.").into()),
            level => Ok(level),
        }
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails; a failing
    /// rollback is logged and the original error returned.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of beginning or committing.
    pub async fn transaction<'c, F, Fut, T>(&'c self, f: F) -> Result<T>
    where
        F: FnOnce(&'c Self) -> Fut,
        Fut: Future<Output = Result<T>> + 'c,
    {
        self.begin_transaction().await?;
        match f(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.roll_back().await {
                    warn!(error = %rollback_err, "Rollback after a failed transaction failed");
                }
                Err(err)
            }
        }
    }
}

/// Runs a transaction control statement through the text protocol.
pub(crate) async fn control(handle: &mut AnyConnection, sql: &str) -> Result<()> {
    debug!(sql = %sql, "Executing SQL");
    handle.execute(sql).await?;
    Ok(())
}
