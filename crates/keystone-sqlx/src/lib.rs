//! # keystone-sqlx
//!
//! The live side of keystone: a [`Connection`] over `sqlx`'s `Any` driver,
//! [`Command`] execution with statement splitting, catalog introspection
//! through [`Schema`], and a database-backed session store.
//!
//! SQL is rendered by `keystone-core`; this crate binds the parameters,
//! runs the statements and decodes the rows.
//!
//! ```rust,no_run
//! use keystone_sqlx::{Connection, ConnectionConfig};
//!
//! # async fn run() -> keystone_sqlx::Result<()> {
//! let db = Connection::open(ConnectionConfig::new("sqlite::memory:")).await?;
//! db.create_command("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);", Default::default())
//!     .execute()
//!     .await?;
//! let table = db.schema().get_table_schema("t", false).await?;
//! assert_eq!(table.map(|t| t.primary_key.clone()), Some(vec!["id".to_string()]));
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
mod row;
pub mod schema;
pub mod session;

pub use command::{Command, InsertResult};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use error::{Error, Result};
pub use schema::Schema;
pub use session::{DbSession, SessionHandler};
