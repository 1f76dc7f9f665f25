//! # keystone-core
//!
//! Dialect-aware SQL building for SQLite, MySQL, PostgreSQL, SQL Server and
//! Oracle, without any IO.
//!
//! This crate provides:
//! - identifier and literal quoting per dialect ([`Quoter`])
//! - column metadata and an immutable column definition builder
//! - a query builder rendering INSERT / upsert / batch / UPDATE / DELETE /
//!   SELECT and DDL statements with every value bound as a parameter
//! - a statement tokenizer used to split scripts and rewrite placeholders
//! - a key/value cache contract with invalidation dependencies
//!
//! ```rust
//! use keystone_core::{driver_for, Params, QueryBuilder};
//!
//! let driver = driver_for("mysql").unwrap();
//! let mut params = Params::new();
//! let sql = QueryBuilder::new(driver).batch_insert(
//!     "customer",
//!     &["name"],
//!     [["a"], ["b"]],
//!     &mut params,
//! );
//! assert_eq!(sql, "INSERT INTO `customer` (`name`) VALUES (:qp0), (:qp1)");
//! assert_eq!(params.len(), 2);
//! ```

pub mod cache;
pub mod column;
pub mod column_builder;
pub mod dialect;
pub mod error;
pub mod params;
pub mod query;
pub mod query_builder;
pub mod quoter;
pub mod table;
pub mod tokenizer;
pub mod value;

pub use cache::{Cache, CacheExt, MemoryCache};
pub use column::{types, ColumnSchema, DefaultValue, ForeignKeyAction, ValueKind};
pub use column_builder::{ColumnSchemaBuilder, ColumnType, Length};
pub use dialect::{driver_for, DialectDriver, DriverName, SequenceOptions};
pub use error::{Error, Result};
pub use params::Params;
pub use query::{
    values, ColumnValue, Condition, Expression, InsertSource, Order, Query, UpsertUpdate,
};
pub use query_builder::QueryBuilder;
pub use quoter::Quoter;
pub use table::{ForeignKey, NoSchema, SchemaSource, SequenceInfo, TableSchema, UniqueConstraint};
pub use tokenizer::{PlaceholderStyle, SqlSyntax};
pub use value::{Row, SqlValue, ToSqlValue};
