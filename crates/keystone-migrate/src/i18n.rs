//! Bootstrap migration for database-stored translations.
//!
//! Creates `source_message(id, category, message)` holding the original
//! strings and `message(id, language, translation)` holding one row per
//! translation, keyed by `(id, language)` and cascading from the source.

use keystone_core::column_builder::{integer, primary_key, string, text};
use keystone_core::{DriverName, ForeignKey, ForeignKeyAction};

use crate::executor::ExecutableMigration;
use crate::operations::MigrationOperation;

/// App name the i18n migrations are recorded under.
pub const APP: &str = "i18n";

/// Name of the bootstrap migration.
pub const INIT_MIGRATION: &str = "m150207_210500_i18n_init";

const SOURCE_MESSAGE: &str = "{{%source_message}}";
const MESSAGE: &str = "{{%message}}";

const MYSQL_TABLE_OPTIONS: &str = "CHARACTER SET utf8 COLLATE utf8_unicode_ci ENGINE=InnoDB";

/// Builds the bootstrap migration for `driver`.
///
/// SQLite cannot add constraints to an existing table, so there the
/// composite key and the foreign key are left out.
#[must_use]
pub fn init_migration(driver: DriverName) -> ExecutableMigration {
    let options = (driver == DriverName::Mysql).then_some(MYSQL_TABLE_OPTIONS);

    let mut migration = ExecutableMigration::new(APP, INIT_MIGRATION)
        .operation(MigrationOperation::create_table(
            SOURCE_MESSAGE,
            [
                ("id", primary_key()),
                ("category", string()),
                ("message", text()),
            ],
            options,
        ))
        .operation(MigrationOperation::create_table(
            MESSAGE,
            [
                ("id", integer().not_null()),
                ("language", string().length(16).not_null()),
                ("translation", text()),
            ],
            options,
        ));

    if driver != DriverName::Sqlite {
        let on_update = match driver {
            DriverName::Sqlsrv => Some(ForeignKeyAction::NoAction),
            DriverName::Oci => None,
            _ => Some(ForeignKeyAction::Restrict),
        };
        let mut foreign_key = ForeignKey::new(
            Some("fk_message_source_message"),
            ["id"],
            SOURCE_MESSAGE,
            ["id"],
        )
        .on_delete(ForeignKeyAction::Cascade);
        if let Some(action) = on_update {
            foreign_key = foreign_key.on_update(action);
        }

        migration = migration
            .operation(MigrationOperation::add_primary_key(
                "pk_message_id_language",
                MESSAGE,
                ["id", "language"],
            ))
            .operation(MigrationOperation::add_foreign_key(MESSAGE, foreign_key));
    }

    migration.operations([
        MigrationOperation::create_index(
            "idx_source_message_category",
            SOURCE_MESSAGE,
            ["category"],
            false,
        ),
        MigrationOperation::create_index("idx_message_language", MESSAGE, ["language"], false),
    ])
}

/// All i18n migrations for `driver`, in apply order.
#[must_use]
pub fn migrations(driver: DriverName) -> Vec<ExecutableMigration> {
    vec![init_migration(driver)]
}
