use super::{common, DialectDriver, DriverName};
use crate::column::ColumnSchema;
use crate::column_builder::ColumnFormat;
use crate::error::Result;
use crate::query_builder::{InsertValues, PreparedInsert, PreparedUpsert};
use crate::quoter::Quoter;
use crate::table::TableSchema;
use crate::tokenizer::{PlaceholderStyle, SqlSyntax};

const TYPE_MAP: &[(&str, &str)] = &[
    ("pk", "int IDENTITY PRIMARY KEY"),
    ("upk", "int IDENTITY PRIMARY KEY"),
    ("bigpk", "bigint IDENTITY PRIMARY KEY"),
    ("ubigpk", "bigint IDENTITY PRIMARY KEY"),
    ("auto", "int IDENTITY"),
    ("bigauto", "bigint IDENTITY"),
    ("char", "nchar(1)"),
    ("string", "nvarchar(255)"),
    ("text", "nvarchar(max)"),
    ("tinyint", "tinyint"),
    ("smallint", "smallint"),
    ("integer", "int"),
    ("bigint", "bigint"),
    ("float", "float"),
    ("double", "float"),
    ("decimal", "decimal(18,0)"),
    ("datetime", "datetime"),
    ("timestamp", "datetime"),
    ("time", "time"),
    ("date", "date"),
    ("binary", "varbinary(max)"),
    ("boolean", "bit"),
    ("money", "decimal(19,4)"),
    ("json", "nvarchar(max)"),
];

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy)]
pub struct MssqlDriver {
    quoter: Quoter,
}

impl MssqlDriver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quoter: Quoter::mssql(),
        }
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectDriver for MssqlDriver {
    fn name(&self) -> DriverName {
        DriverName::Sqlsrv
    }

    fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    fn syntax(&self) -> SqlSyntax {
        SqlSyntax {
            bracket_identifiers: true,
            ..SqlSyntax::ANSI
        }
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    fn type_map(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_MAP
    }

    fn column_format(&self) -> ColumnFormat {
        ColumnFormat {
            default: "{type}{length}{notnull}{unique}{default}{check}{append}",
            pk: "{type}{check}{append}",
            numeric: "{type}{length}{notnull}{unique}{default}{check}{append}",
        }
    }

    fn insert_returning_sql(
        &self,
        insert: &PreparedInsert<'_>,
        primary_key: &[String],
    ) -> Result<String> {
        if primary_key.is_empty() {
            return Ok(self.insert_sql(insert));
        }
        let output: Vec<String> = primary_key
            .iter()
            .map(|pk| format!("INSERTED.{}", self.quoter.quote_column_name(pk)))
            .collect();
        let output = format!("OUTPUT {}", output.join(", "));
        Ok(common::insert_sql(&self.quoter, insert, Some(&output)))
    }

    fn upsert_sql(&self, upsert: &PreparedUpsert<'_>) -> String {
        let q = &self.quoter;
        let source = match upsert.insert.values {
            InsertValues::Row(ref placeholders) => format!("VALUES ({})", placeholders.join(", ")),
            InsertValues::Select(ref select) => select.clone(),
            InsertValues::Default => return self.insert_sql(&upsert.insert),
        };
        let excluded_table = q.quote_table_name("EXCLUDED");
        let excluded = |column: &str| format!("{excluded_table}.{}", q.quote_column_name(column));
        format!(
            "MERGE {} WITH (HOLDLOCK) USING ({source}) AS {excluded_table}{}{};",
            upsert.insert.table,
            common::column_list(q, &upsert.insert.columns),
            common::merge_tail(q, upsert, excluded)
        )
    }

    fn order_by_and_limit_sql(
        &self,
        order_by: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> String {
        if limit.is_none() && offset.is_none() {
            return order_by.to_string();
        }
        // OFFSET/FETCH requires an ORDER BY.
        let mut sql = if order_by.is_empty() {
            "ORDER BY (SELECT NULL)".to_string()
        } else {
            order_by.to_string()
        };
        sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
        if let Some(limit) = limit {
            sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        sql
    }

    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "sp_rename {}, {}",
            self.quoter.quote_table_name(old_name),
            self.quoter.quote_table_name(new_name)
        )
    }

    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        let q = &self.quoter;
        format!(
            "sp_rename '{}.{}', {}, 'COLUMN'",
            q.quote_table_name(table),
            q.quote_column_name(old_name),
            q.quote_column_name(new_name)
        )
    }

    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {column_type}",
            self.quoter.quote_table_name(table),
            self.quoter.quote_column_name(column)
        ))
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn reset_auto_increment_sql(
        &self,
        table: &TableSchema,
        _column: &ColumnSchema,
        value: i64,
    ) -> Result<String> {
        Ok(format!(
            "DBCC CHECKIDENT ('{}', RESEED, {})",
            self.quoter.quote_table_name(&table.full_name),
            value - 1
        ))
    }

    fn last_insert_id_sql(&self, _sequence: Option<&str>) -> Result<String> {
        Ok("SELECT CAST(SCOPE_IDENTITY() AS bigint)".to_string())
    }
}
