//! Migration history tracking.
//!
//! This module manages the `{{%migration}}` table that records which
//! migrations have been applied to the database.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use keystone_core::{Condition, Order, Params, Query, Row};
use keystone_sqlx::Connection;

use crate::error::{MigrateError, Result};

/// Default name of the history table.
pub const DEFAULT_TABLE: &str = "{{%migration}}";

/// A record of an applied migration.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    /// Unique ID in the migrations table.
    pub id: i64,
    /// Application/module name.
    pub app: String,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    fn from_row(row: &Row) -> Self {
        let applied_at = row.get_string("applied_at").unwrap_or_default();
        Self {
            id: row.get_i64("id").unwrap_or_default(),
            app: row.get_string("app").unwrap_or_default(),
            name: row.get_string("name").unwrap_or_default(),
            applied_at: parse_timestamp(&applied_at),
        }
    }
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_default()
}

/// Manages the migration history in the database.
#[derive(Debug, Clone, Copy)]
pub struct MigrationHistory<'c> {
    db: &'c Connection,
    table: &'c str,
}

impl<'c> MigrationHistory<'c> {
    /// Creates a history stored in [`DEFAULT_TABLE`].
    #[must_use]
    pub const fn new(db: &'c Connection) -> Self {
        Self {
            db,
            table: DEFAULT_TABLE,
        }
    }

    /// Stores the history in `table` instead.
    #[must_use]
    pub const fn with_table(mut self, table: &'c str) -> Self {
        self.table = table;
        self
    }

    #[must_use]
    pub const fn table(&self) -> &str {
        self.table
    }

    /// Ensures the migrations table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        if self.db.schema().get_table_schema(self.table, true).await?.is_some() {
            return Ok(());
        }
        self.db
            .create_command("", Params::new())
            .create_table(
                self.table,
                [
                    ("id", "pk"),
                    ("app", "string NOT NULL"),
                    ("name", "string NOT NULL"),
                    ("applied_at", "string NOT NULL"),
                ],
                None,
            )
            .execute()
            .await?;
        let index = format!("idx_{}_app_name", self.db.schema().raw_table_name(self.table));
        self.db
            .create_command("", Params::new())
            .create_index(&index, self.table, &["app", "name"], true)
            .execute()
            .await?;
        Ok(())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, app: &str, name: &str) -> Result<()> {
        let applied_at = Utc::now().to_rfc3339();
        self.db
            .create_command("", Params::new())
            .insert(
                self.table,
                [("app", app), ("name", name), ("applied_at", applied_at.as_str())],
            )
            .await?
            .execute()
            .await?;
        Ok(())
    }

    /// Removes a migration record (for rollback).
    pub async fn record_unapplied(&self, app: &str, name: &str) -> Result<()> {
        let removed = self
            .db
            .create_command("", Params::new())
            .delete(self.table, Some(&migration_condition(app, name)))
            .execute()
            .await?;

        if removed == 0 {
            return Err(MigrateError::MigrationNotFound {
                app: app.to_string(),
                name: name.to_string(),
            });
        }

        Ok(())
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, app: &str, name: &str) -> Result<bool> {
        let query = Query::new()
            .select(["id"])
            .from(self.table)
            .filter(migration_condition(app, name));
        Ok(!self.fetch(&query).await?.is_empty())
    }

    /// Gets all applied migrations.
    pub async fn get_applied(&self) -> Result<Vec<AppliedMigration>> {
        let rows = self.fetch(&self.select()).await?;
        Ok(rows.iter().map(AppliedMigration::from_row).collect())
    }

    /// Gets applied migrations for a specific app.
    pub async fn get_applied_for_app(&self, app: &str) -> Result<Vec<AppliedMigration>> {
        let query = self.select().filter(Condition::eq("app", app));
        let rows = self.fetch(&query).await?;
        Ok(rows.iter().map(AppliedMigration::from_row).collect())
    }

    /// Gets the last applied migration, optionally of one app.
    pub async fn get_last_applied(&self, app: Option<&str>) -> Result<Option<AppliedMigration>> {
        let mut query = Query::new()
            .select(["id", "app", "name", "applied_at"])
            .from(self.table)
            .order_by("id", Order::Desc);
        if let Some(app) = app {
            query = query.filter(Condition::eq("app", app));
        }
        query.limit = Some(1);
        let rows = self.fetch(&query).await?;
        Ok(rows.first().map(AppliedMigration::from_row))
    }

    /// Counts applied migrations.
    pub async fn count_applied(&self) -> Result<usize> {
        Ok(self.get_applied().await?.len())
    }

    /// Gets a set of applied migration identifiers (app/name pairs).
    pub async fn get_applied_set(&self) -> Result<HashSet<(String, String)>> {
        Ok(self
            .get_applied()
            .await?
            .into_iter()
            .map(|m| (m.app, m.name))
            .collect())
    }

    fn select(&self) -> Query {
        Query::new()
            .select(["id", "app", "name", "applied_at"])
            .from(self.table)
            .order_by("id", Order::Asc)
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>> {
        let mut params = Params::new();
        let sql = self.db.query_builder().build_select(query, &mut params);
        Ok(self.db.create_command(sql, params).query_all().await?)
    }
}

fn migration_condition(app: &str, name: &str) -> Condition {
    Condition::eq("app", app).and(Condition::eq("name", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_sqlx::ConnectionConfig;

    async fn create_test_connection() -> Connection {
        Connection::open(ConnectionConfig::new("sqlite::memory:"))
            .await
            .expect("Failed to open in-memory SQLite")
    }

    #[tokio::test]
    async fn test_ensure_table() {
        let db = create_test_connection().await;
        let history = MigrationHistory::new(&db);

        history.ensure_table().await.unwrap();
        // Idempotent
        history.ensure_table().await.unwrap();
    }

    #[tokio::test]
    async fn test_record_and_check_applied() {
        let db = create_test_connection().await;
        let history = MigrationHistory::new(&db);
        history.ensure_table().await.unwrap();

        assert!(!history.is_applied("i18n", "0001_init").await.unwrap());
        history.record_applied("i18n", "0001_init").await.unwrap();
        assert!(history.is_applied("i18n", "0001_init").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_applied() {
        let db = create_test_connection().await;
        let history = MigrationHistory::new(&db);
        history.ensure_table().await.unwrap();

        history.record_applied("i18n", "0001_init").await.unwrap();
        history.record_applied("i18n", "0002_context").await.unwrap();
        history.record_applied("session", "0001_init").await.unwrap();

        let all = history.get_applied().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "0001_init");
        assert!(all[0].applied_at <= Utc::now());

        let i18n_only = history.get_applied_for_app("i18n").await.unwrap();
        assert_eq!(i18n_only.len(), 2);
        assert_eq!(history.count_applied().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_record_unapplied() {
        let db = create_test_connection().await;
        let history = MigrationHistory::new(&db);
        history.ensure_table().await.unwrap();

        history.record_applied("i18n", "0001_init").await.unwrap();
        history.record_unapplied("i18n", "0001_init").await.unwrap();
        assert!(!history.is_applied("i18n", "0001_init").await.unwrap());

        let err = history.record_unapplied("i18n", "0001_init").await.unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_last_applied() {
        let db = create_test_connection().await;
        let history = MigrationHistory::new(&db);
        history.ensure_table().await.unwrap();

        assert!(history.get_last_applied(None).await.unwrap().is_none());

        history.record_applied("i18n", "0001_init").await.unwrap();
        history.record_applied("i18n", "0002_context").await.unwrap();
        history.record_applied("session", "0001_init").await.unwrap();

        let last = history.get_last_applied(Some("i18n")).await.unwrap().unwrap();
        assert_eq!(last.name, "0002_context");
        let last = history.get_last_applied(None).await.unwrap().unwrap();
        assert_eq!(last.app, "session");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-01T10:00:00+00:00");
        let sqlite = parse_timestamp("2024-03-01 10:00:00");
        assert_eq!(rfc, sqlite);
    }
}
