use std::sync::OnceLock;

use regex::Regex;

use super::{common, DialectDriver, DriverName};
use crate::column::ColumnSchema;
use crate::error::{Error, Result};
use crate::query_builder::{PreparedInsert, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::TableSchema;
use crate::tokenizer::{PlaceholderStyle, SqlSyntax};

const TYPE_MAP: &[(&str, &str)] = &[
    ("pk", "serial NOT NULL PRIMARY KEY"),
    ("upk", "serial NOT NULL PRIMARY KEY"),
    ("bigpk", "bigserial NOT NULL PRIMARY KEY"),
    ("ubigpk", "bigserial NOT NULL PRIMARY KEY"),
    ("auto", "serial"),
    ("bigauto", "bigserial"),
    ("char", "char(1)"),
    ("string", "varchar(255)"),
    ("text", "text"),
    ("tinyint", "smallint"),
    ("smallint", "smallint"),
    ("integer", "integer"),
    ("bigint", "bigint"),
    ("float", "double precision"),
    ("double", "double precision"),
    ("decimal", "numeric(10,0)"),
    ("datetime", "timestamp(0)"),
    ("timestamp", "timestamp(0)"),
    ("time", "time(0)"),
    ("date", "date"),
    ("binary", "bytea"),
    ("boolean", "boolean"),
    ("money", "numeric(19,4)"),
    ("json", "jsonb"),
];

/// PostgreSQL.
#[derive(Debug, Clone, Copy)]
pub struct PostgresDriver {
    quoter: Quoter,
}

impl PostgresDriver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quoter: Quoter::postgres(),
        }
    }

    fn setval_sql(&self, sequence: &str, value: i64) -> String {
        format!("SELECT SETVAL({}, {value}, false)", self.quoter.quote_str(sequence))
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// A column definition split into the parts `ALTER COLUMN` sets separately.
struct AlterParts<'a> {
    base: &'a str,
    not_null: Option<bool>,
    unique: bool,
    default: Option<&'a str>,
}

fn split_alter_definition(definition: &str) -> AlterParts<'_> {
    static DEFAULT: OnceLock<Regex> = OnceLock::new();
    static MODIFIERS: OnceLock<Regex> = OnceLock::new();

    let default_re = DEFAULT
        .get_or_init(|| Regex::new(r"(?is)\s+DEFAULT\s+(.+)$").expect("static regex is valid"));
    let (head, default) = match default_re.captures(definition) {
        Some(caps) => {
            let start = caps.get(0).map_or(definition.len(), |m| m.start());
            (&definition[..start], caps.get(1).map(|m| m.as_str().trim()))
        }
        None => (definition, None),
    };

    let modifiers = MODIFIERS.get_or_init(|| {
        Regex::new(r"(?i)\s+(NOT\s+NULL|NULL|UNIQUE)\b").expect("static regex is valid")
    });
    let mut not_null = None;
    let mut unique = false;
    let mut base_end = head.len();
    for caps in modifiers.captures_iter(head) {
        let Some(m) = caps.get(0) else { continue };
        base_end = base_end.min(m.start());
        let word = caps[1].to_ascii_uppercase();
        if word == "UNIQUE" {
            unique = true;
        } else {
            not_null = Some(word.starts_with("NOT"));
        }
    }
    AlterParts {
        base: head[..base_end].trim(),
        not_null,
        unique,
        default,
    }
}

impl DialectDriver for PostgresDriver {
    fn name(&self) -> DriverName {
        DriverName::Pgsql
    }

    fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    fn syntax(&self) -> SqlSyntax {
        SqlSyntax {
            dollar_quotes: true,
            ..SqlSyntax::ANSI
        }
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn type_map(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_MAP
    }

    fn insert_returning_sql(
        &self,
        insert: &PreparedInsert<'_>,
        primary_key: &[String],
    ) -> Result<String> {
        let sql = self.insert_sql(insert);
        if primary_key.is_empty() {
            return Ok(sql);
        }
        Ok(format!(
            "{sql} RETURNING {}",
            common::quote_columns(&self.quoter, primary_key)
        ))
    }

    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String {
        let q = &self.quoter;
        let insert = common::insert_sql(q, &upsert.insert, None);
        match upsert.updates() {
            None => format!("{insert} ON CONFLICT DO NOTHING"),
            Some(updates) => {
                let keys = upsert.constraints.first().map(Vec::as_slice).unwrap_or_default();
                let excluded = |column: &str| format!("EXCLUDED.{}", q.quote_column_name(column));
                format!(
                    "{insert} ON CONFLICT ({}) DO UPDATE SET {}",
                    common::quote_columns(q, keys),
                    common::update_assignments(q, updates, excluded)
                )
            }
        }
    }

    fn add_column_sql(&self, table: &str, column: &str, column_type: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {column_type}",
            self.quoter.quote_table_name(table),
            self.quoter.quote_column_name(column)
        )
    }

    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Result<String> {
        let q = &self.quoter;
        let column = q.quote_column_name(column);
        let parts = split_alter_definition(column_type);
        let mut sql = format!(
            "ALTER TABLE {} ALTER COLUMN {column} TYPE {}",
            q.quote_table_name(table),
            parts.base
        );
        if let Some(default) = parts.default {
            if default.eq_ignore_ascii_case("NULL") {
                sql.push_str(&format!(", ALTER COLUMN {column} DROP DEFAULT"));
            } else {
                sql.push_str(&format!(", ALTER COLUMN {column} SET DEFAULT {default}"));
            }
        }
        match parts.not_null {
            Some(true) => sql.push_str(&format!(", ALTER COLUMN {column} SET NOT NULL")),
            Some(false) => sql.push_str(&format!(", ALTER COLUMN {column} DROP NOT NULL")),
            None => {}
        }
        if parts.unique {
            sql.push_str(&format!(", ADD UNIQUE ({column})"));
        }
        Ok(sql)
    }

    fn drop_index_sql(&self, name: &str, table: &str) -> String {
        let q = &self.quoter;
        let parts = q.get_table_name_parts(table, false);
        let index = q.quote_simple_table_name(name);
        match parts.as_slice() {
            [schema, _] => format!("DROP INDEX {}.{index}", q.quote_simple_table_name(schema)),
            _ => format!("DROP INDEX {index}"),
        }
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn reset_sequence_sql(&self, name: &str, value: i64) -> Result<String> {
        Ok(self.setval_sql(name, value))
    }

    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        column: &ColumnSchema,
        value: i64,
    ) -> Result<String> {
        let sequence = column
            .sequence_name
            .as_deref()
            .or(table.sequence_name.as_deref())
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Table '{}' has no sequence backing column '{}'.",
                    table.full_name, column.name
                ))
            })?;
        Ok(self.setval_sql(sequence, value))
    }

    fn last_insert_id_sql(&self, sequence: Option<&str>) -> Result<String> {
        Ok(match sequence {
            Some(sequence) => format!("SELECT CURRVAL({})", self.quoter.quote_str(sequence)),
            None => "SELECT LASTVAL()".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_alter_definition() {
        let parts = split_alter_definition("varchar(64) NOT NULL DEFAULT 'a b'");
        assert_eq!(parts.base, "varchar(64)");
        assert_eq!(parts.not_null, Some(true));
        assert_eq!(parts.default, Some("'a b'"));
        assert!(!parts.unique);

        let parts = split_alter_definition("integer NULL UNIQUE");
        assert_eq!(parts.base, "integer");
        assert_eq!(parts.not_null, Some(false));
        assert!(parts.unique);
        assert_eq!(parts.default, None);
    }
}
