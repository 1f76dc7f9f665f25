use super::{common, DialectDriver, DriverName};
use crate::column::ColumnSchema;
use crate::column_builder::ColumnFormat;
use crate::error::Result;
use crate::query_builder::{PreparedInsert, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::TableSchema;
use crate::tokenizer::SqlSyntax;

const TYPE_MAP: &[(&str, &str)] = &[
    ("pk", "int(11) NOT NULL AUTO_INCREMENT PRIMARY KEY"),
    ("upk", "int(10) UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"),
    ("bigpk", "bigint(20) NOT NULL AUTO_INCREMENT PRIMARY KEY"),
    ("ubigpk", "bigint(20) UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"),
    ("auto", "int(11) AUTO_INCREMENT"),
    ("bigauto", "bigint(20) AUTO_INCREMENT"),
    ("char", "char(1)"),
    ("string", "varchar(255)"),
    ("text", "text"),
    ("tinyint", "tinyint(3)"),
    ("smallint", "smallint(6)"),
    ("integer", "int(11)"),
    ("bigint", "bigint(20)"),
    ("float", "float"),
    ("double", "double"),
    ("decimal", "decimal(10,0)"),
    ("datetime", "datetime"),
    ("timestamp", "timestamp"),
    ("time", "time"),
    ("date", "date"),
    ("binary", "blob"),
    ("boolean", "tinyint(1)"),
    ("money", "decimal(19,4)"),
    ("json", "json"),
];

/// MySQL and MariaDB.
#[derive(Debug, Clone, Copy)]
pub struct MysqlDriver {
    quoter: Quoter,
}

impl MysqlDriver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quoter: Quoter::mysql(),
        }
    }
}

impl Default for MysqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectDriver for MysqlDriver {
    fn name(&self) -> DriverName {
        DriverName::Mysql
    }

    fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    fn syntax(&self) -> SqlSyntax {
        SqlSyntax {
            hash_comments: true,
            backslash_escapes: true,
            ..SqlSyntax::ANSI
        }
    }

    fn type_map(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_MAP
    }

    fn column_format(&self) -> ColumnFormat {
        ColumnFormat {
            default: "{type}{length}{notnull}{unique}{default}{check}{comment}{append}{pos}",
            pk: "{type}{check}{comment}{append}{pos}",
            numeric: "{type}{length}{unsigned}{notnull}{unique}{default}{check}{comment}{append}{pos}",
        }
    }

    fn supports_unsigned(&self) -> bool {
        true
    }

    fn inline_column_comment(&self) -> bool {
        true
    }

    fn supports_column_position(&self) -> bool {
        true
    }

    fn default_values_sql(&self, insert: &PreparedInsert<'_>) -> String {
        format!("INSERT INTO {} () VALUES ()", insert.table)
    }

    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String {
        let q = &self.quoter;
        let insert = common::insert_sql(q, &upsert.insert, None);
        match upsert.updates() {
            None => insert.replacen("INSERT INTO", "INSERT IGNORE INTO", 1),
            Some(updates) => {
                let excluded = |column: &str| format!("VALUES({})", q.quote_column_name(column));
                format!(
                    "{insert} ON DUPLICATE KEY UPDATE {}",
                    common::update_assignments(q, updates, excluded)
                )
            }
        }
    }

    fn order_by_and_limit_sql(
        &self,
        order_by: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !order_by.is_empty() {
            parts.push(order_by.to_string());
        }
        match (limit, offset) {
            (Some(limit), _) => parts.push(format!("LIMIT {limit}")),
            // MySQL has no OFFSET without LIMIT.
            (None, Some(_)) => parts.push(format!("LIMIT {}", u64::MAX)),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {offset}"));
        }
        parts.join(" ")
    }

    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quoter.quote_table_name(old_name),
            self.quoter.quote_table_name(new_name)
        )
    }

    fn drop_primary_key_sql(&self, _name: &str, table: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP PRIMARY KEY",
            self.quoter.quote_table_name(table)
        ))
    }

    fn drop_foreign_key_sql(&self, name: &str, table: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quoter.quote_table_name(table),
            self.quoter.quote_column_name(name)
        ))
    }

    fn drop_unique_sql(&self, name: &str, table: &str) -> String {
        self.drop_index_sql(name, table)
    }

    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        _column: &ColumnSchema,
        value: i64,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} AUTO_INCREMENT={value}",
            self.quoter.quote_table_name(&table.full_name)
        ))
    }

    fn last_insert_id_sql(&self, _sequence: Option<&str>) -> Result<String> {
        Ok("SELECT LAST_INSERT_ID()".to_string())
    }
}
