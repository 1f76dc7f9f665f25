//! Rendering helpers shared by the dialect drivers.

use std::sync::OnceLock;

use regex::Regex;

use super::SequenceOptions;
use crate::query_builder::{InsertValues, PreparedInsert, PreparedUpsert, UpdateSource};
use crate::quoter::Quoter;
use crate::table::ForeignKey;

/// Looks an abstract type up in a type map.
#[must_use]
pub fn lookup_type(type_map: &[(&str, &'static str)], token: &str) -> Option<&'static str> {
    type_map
        .iter()
        .find(|(abstract_type, _)| *abstract_type == token)
        .map(|(_, db_type)| *db_type)
}

/// Resolves an abstract column definition through `type_map`.
///
/// - an exact abstract token maps directly;
/// - `token(args)rest` maps the token and replaces the parenthesised part
///   of the mapped type with `(args)`, then appends `rest`;
/// - `token rest` maps the leading token and keeps the rest;
/// - anything else is a raw database type and passes through unchanged.
#[must_use]
pub fn map_column_type(type_map: &[(&str, &'static str)], definition: &str) -> String {
    static WITH_ARGS: OnceLock<Regex> = OnceLock::new();
    static WITH_REST: OnceLock<Regex> = OnceLock::new();
    static PARENS: OnceLock<Regex> = OnceLock::new();

    if let Some(db_type) = lookup_type(type_map, definition) {
        return db_type.to_string();
    }

    let with_args = WITH_ARGS
        .get_or_init(|| Regex::new(r"(?s)^(\w+)\((.+?)\)(.*)$").expect("static regex is valid"));
    if let Some(caps) = with_args.captures(definition) {
        if let Some(db_type) = lookup_type(type_map, &caps[1]) {
            let parens =
                PARENS.get_or_init(|| Regex::new(r"\(.+\)").expect("static regex is valid"));
            let replacement = format!("({})", &caps[2]);
            let mapped = parens.replace(db_type, regex::NoExpand(&replacement));
            return format!("{mapped}{}", &caps[3]);
        }
        return definition.to_string();
    }

    let with_rest =
        WITH_REST.get_or_init(|| Regex::new(r"(?s)^(\w+)(\s+.*)$").expect("static regex is valid"));
    if let Some(caps) = with_rest.captures(definition) {
        if let Some(db_type) = lookup_type(type_map, &caps[1]) {
            return format!("{db_type}{}", &caps[2]);
        }
    }

    definition.to_string()
}

/// Quotes and joins column names with `, `.
#[must_use]
pub fn quote_columns<S: AsRef<str>>(quoter: &Quoter, columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quoter.quote_column_name(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders ` (a, b)`, or nothing for an empty list.
#[must_use]
pub fn column_list<S: AsRef<str>>(quoter: &Quoter, columns: &[S]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        format!(" ({})", quote_columns(quoter, columns))
    }
}

/// Renders `INSERT INTO t (cols)[ output] VALUES (...)` or
/// `INSERT INTO t (cols)[ output] SELECT ...`.
///
/// Default-values inserts are rendered by the driver.
#[must_use]
pub fn insert_sql(quoter: &Quoter, insert: &PreparedInsert<'_>, output: Option<&str>) -> String {
    let columns = column_list(quoter, &insert.columns);
    let output = output.map(|o| format!(" {o}")).unwrap_or_default();
    match insert.values {
        InsertValues::Row(ref placeholders) => format!(
            "INSERT INTO {}{columns}{output} VALUES ({})",
            insert.table,
            placeholders.join(", ")
        ),
        InsertValues::Select(ref select) => {
            format!("INSERT INTO {}{columns}{output} {select}", insert.table)
        }
        InsertValues::Default => format!("INSERT INTO {}{output} DEFAULT VALUES", insert.table),
    }
}

/// Renders the SET list of an upsert, using `excluded` to reference the
/// inserted value of a column.
pub fn update_assignments(
    quoter: &Quoter,
    updates: &[(String, UpdateSource)],
    excluded: impl Fn(&str) -> String,
) -> String {
    updates
        .iter()
        .map(|(column, source)| {
            let value = match source {
                UpdateSource::Excluded => excluded(column.as_str()),
                UpdateSource::Sql(sql) => sql.clone(),
            };
            format!("{}={value}", quoter.quote_column_name(column))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the condition matching an existing row on any of the upsert's
/// conflict constraints.
///
/// Columns of one constraint are joined with AND; several constraints are
/// parenthesised and joined with OR.
pub fn conflict_match(
    quoter: &Quoter,
    upsert: &PreparedUpsert<'_>,
    excluded: impl Fn(&str) -> String,
) -> String {
    let table = &upsert.insert.table;
    let parts: Vec<String> = upsert
        .constraints
        .iter()
        .map(|keys| {
            keys.iter()
                .map(|key| format!("{table}.{}={}", quoter.quote_column_name(key), excluded(key.as_str())))
                .collect::<Vec<_>>()
                .join(" AND ")
        })
        .collect();
    if parts.len() == 1 {
        parts.into_iter().collect()
    } else {
        format!("({})", parts.join(") OR ("))
    }
}

/// Renders the `ON ... WHEN MATCHED ... WHEN NOT MATCHED ...` tail of a
/// MERGE statement.
pub fn merge_tail(
    quoter: &Quoter,
    upsert: &PreparedUpsert<'_>,
    excluded: impl Fn(&str) -> String,
) -> String {
    let mut sql = format!(" ON ({})", conflict_match(quoter, upsert, &excluded));
    if let Some(updates) = upsert.updates() {
        sql.push_str(" WHEN MATCHED THEN UPDATE SET ");
        sql.push_str(&update_assignments(quoter, updates, &excluded));
    }
    let values: Vec<String> = upsert.insert.columns.iter().map(|c| excluded(c.as_str())).collect();
    sql.push_str(&format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        quote_columns(quoter, &upsert.insert.columns),
        values.join(", ")
    ));
    sql
}

/// `CREATE TABLE` with one column or constraint per line.
#[must_use]
pub fn create_table_sql(
    quoter: &Quoter,
    table: &str,
    columns: &[(String, String)],
    options: Option<&str>,
) -> String {
    let lines: Vec<String> = columns
        .iter()
        .map(|(name, definition)| {
            if name.is_empty() {
                format!("\t{definition}")
            } else {
                format!("\t{} {definition}", quoter.quote_column_name(name))
            }
        })
        .collect();
    let mut sql = format!(
        "CREATE TABLE {} (\n{}\n)",
        quoter.quote_table_name(table),
        lines.join(",\n")
    );
    if let Some(options) = options {
        sql.push(' ');
        sql.push_str(options);
    }
    sql
}

/// `ALTER TABLE t DROP CONSTRAINT name`.
#[must_use]
pub fn drop_constraint_sql(quoter: &Quoter, name: &str, table: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT {}",
        quoter.quote_table_name(table),
        quoter.quote_column_name(name)
    )
}

/// `ALTER TABLE t ADD [CONSTRAINT n] FOREIGN KEY ... REFERENCES ...`.
#[must_use]
pub fn add_foreign_key_sql(quoter: &Quoter, table: &str, fk: &ForeignKey) -> String {
    let mut sql = format!("ALTER TABLE {} ADD ", quoter.quote_table_name(table));
    if let Some(ref name) = fk.name {
        sql.push_str(&format!("CONSTRAINT {} ", quoter.quote_column_name(name)));
    }
    sql.push_str(&format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_columns(quoter, &fk.columns),
        quoter.quote_table_name(&fk.foreign_table),
        quote_columns(quoter, &fk.foreign_columns)
    ));
    if let Some(action) = fk.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = fk.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    sql
}

/// `CREATE SEQUENCE` with the given options.
#[must_use]
pub fn create_sequence_sql(
    quoter: &Quoter,
    name: &str,
    start: i64,
    increment: i64,
    options: &SequenceOptions,
) -> String {
    let mut sql = format!(
        "CREATE SEQUENCE {} START WITH {start} INCREMENT BY {increment}",
        quoter.quote_table_name(name)
    );
    if let Some(min) = options.min_value {
        sql.push_str(&format!(" MINVALUE {min}"));
    }
    if let Some(max) = options.max_value {
        sql.push_str(&format!(" MAXVALUE {max}"));
    }
    if options.cycle {
        sql.push_str(" CYCLE");
    }
    if let Some(cache) = options.cache {
        sql.push_str(&format!(" CACHE {cache}"));
    }
    sql
}
