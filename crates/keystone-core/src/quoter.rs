//! Identifier and value quoting.
//!
//! Each dialect is described by a [`Quoter`] value: its identifier quote
//! characters, how many dotted name segments it keeps, and how string
//! literals are escaped.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::value::SqlValue;

/// Identifier and literal quoting rules of one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quoter {
    column_quote: (char, char),
    table_quote: (char, char),
    quote_table_segments: bool,
    table_parts: usize,
    fixed_table_parts: bool,
    backslash_escapes: bool,
    bool_literals: (&'static str, &'static str),
    blob_hex_prefix: &'static str,
}

impl Quoter {
    /// SQLite: backticks, exactly `schema.table`.
    #[must_use]
    pub const fn sqlite() -> Self {
        Self {
            column_quote: ('`', '`'),
            table_quote: ('`', '`'),
            quote_table_segments: false,
            table_parts: 2,
            fixed_table_parts: true,
            backslash_escapes: false,
            bool_literals: ("1", "0"),
            blob_hex_prefix: "X'",
        }
    }

    /// MySQL: backticks, backslash-escaped string literals.
    #[must_use]
    pub const fn mysql() -> Self {
        Self {
            column_quote: ('`', '`'),
            table_quote: ('`', '`'),
            quote_table_segments: false,
            table_parts: 2,
            fixed_table_parts: false,
            backslash_escapes: true,
            bool_literals: ("1", "0"),
            blob_hex_prefix: "X'",
        }
    }

    /// PostgreSQL: double quotes.
    #[must_use]
    pub const fn postgres() -> Self {
        Self {
            column_quote: ('"', '"'),
            table_quote: ('"', '"'),
            quote_table_segments: false,
            table_parts: 2,
            fixed_table_parts: false,
            backslash_escapes: false,
            bool_literals: ("TRUE", "FALSE"),
            blob_hex_prefix: "'\\x",
        }
    }

    /// SQL Server: brackets around every dotted segment, up to
    /// `catalog.schema.table`.
    #[must_use]
    pub const fn mssql() -> Self {
        Self {
            column_quote: ('[', ']'),
            table_quote: ('[', ']'),
            quote_table_segments: true,
            table_parts: 3,
            fixed_table_parts: false,
            backslash_escapes: false,
            bool_literals: ("1", "0"),
            blob_hex_prefix: "0x",
        }
    }

    /// Oracle: double quotes.
    #[must_use]
    pub const fn oracle() -> Self {
        Self {
            column_quote: ('"', '"'),
            table_quote: ('"', '"'),
            quote_table_segments: false,
            table_parts: 2,
            fixed_table_parts: false,
            backslash_escapes: false,
            bool_literals: ("1", "0"),
            blob_hex_prefix: "HEXTORAW('",
        }
    }

    /// Returns the opening and closing column quote characters.
    #[must_use]
    pub const fn column_quote(&self) -> (char, char) {
        self.column_quote
    }

    /// Returns the opening and closing table quote characters.
    #[must_use]
    pub const fn table_quote(&self) -> (char, char) {
        self.table_quote
    }

    /// Quotes a single column name. `*` and already quoted names are
    /// returned unchanged.
    #[must_use]
    pub fn quote_simple_column_name(&self, name: &str) -> String {
        let (open, close) = self.column_quote;
        if name == "*" || name.starts_with(open) {
            return name.to_string();
        }
        wrap(name, open, close)
    }

    /// Quotes a table name without interpreting schema prefixes, except on
    /// dialects that quote every dotted segment.
    #[must_use]
    pub fn quote_simple_table_name(&self, name: &str) -> String {
        let (open, close) = self.table_quote;
        if self.quote_table_segments {
            let Some(parts) = split_parts(name, self.table_quote) else {
                return name.to_string();
            };
            return parts
                .iter()
                .map(|part| {
                    if part.starts_with(open) {
                        (*part).to_string()
                    } else {
                        wrap(part, open, close)
                    }
                })
                .collect::<Vec<_>>()
                .join(".");
        }
        if name.starts_with(open) {
            return name.to_string();
        }
        wrap(name, open, close)
    }

    /// Removes the column quotes from `name`, if present.
    #[must_use]
    pub fn unquote_simple_column_name(&self, name: &str) -> String {
        unwrap(name, self.column_quote)
    }

    /// Removes the table quotes from `name`, if present.
    #[must_use]
    pub fn unquote_simple_table_name(&self, name: &str) -> String {
        if self.quote_table_segments {
            if let Some(parts) = split_parts(name, self.table_quote) {
                return parts
                    .iter()
                    .map(|p| unwrap(p, self.table_quote))
                    .collect::<Vec<_>>()
                    .join(".");
            }
            return name.to_string();
        }
        unwrap(name, self.table_quote)
    }

    /// Quotes a column name that may carry a table prefix.
    ///
    /// Names containing `(`, `[[` or `{{` are treated as expressions and
    /// returned unchanged.
    #[must_use]
    pub fn quote_column_name(&self, name: &str) -> String {
        if name.contains('(') || name.contains("[[") || name.contains("{{") {
            return name.to_string();
        }
        match rsplit_outside_quotes(name, self.table_quote) {
            Some((prefix, column)) if !prefix.is_empty() && !column.is_empty() => {
                format!(
                    "{}.{}",
                    self.quote_table_name(prefix),
                    self.quote_simple_column_name(column)
                )
            }
            Some(_) => name.to_string(),
            None => self.quote_simple_column_name(name),
        }
    }

    /// Quotes a table name that may carry a schema prefix and an alias.
    #[must_use]
    pub fn quote_table_name(&self, name: &str) -> String {
        let trimmed = name.trim();
        if trimmed.starts_with('(') && trimmed.ends_with(')') {
            return name.to_string();
        }
        if trimmed.contains("{{") || trimmed.contains('(') {
            return name.to_string();
        }
        if let Some((table, alias)) = split_alias(trimmed) {
            return format!(
                "{} {}",
                self.quote_table_name(table),
                self.quote_simple_table_name(alias)
            );
        }
        if self.quote_table_segments {
            return self.quote_simple_table_name(trimmed);
        }
        match split_parts(trimmed, self.table_quote) {
            Some(parts) => parts
                .iter()
                .map(|p| self.quote_simple_table_name(p))
                .collect::<Vec<_>>()
                .join("."),
            None => name.to_string(),
        }
    }

    /// Splits a possibly qualified name into its unquoted parts.
    ///
    /// At most the trailing two segments (three with `with_column`) are
    /// kept; SQLite keeps exactly `schema.table`. SQL Server additionally
    /// allows a catalog prefix. Malformed names come back as a single part
    /// holding the original string.
    #[must_use]
    pub fn get_table_name_parts(&self, name: &str, with_column: bool) -> Vec<String> {
        let Some(parts) = split_parts(name, self.table_quote) else {
            return vec![name.to_string()];
        };
        let keep = if self.fixed_table_parts {
            self.table_parts
        } else {
            self.table_parts + usize::from(with_column)
        };
        let skip = parts.len().saturating_sub(keep);
        if skip > 0 {
            debug!(name, dropped = skip, "Discarding leading table name segments");
        }
        parts[skip..]
            .iter()
            .map(|p| unwrap(p, self.table_quote))
            .collect()
    }

    /// Quotes a string value as a SQL literal.
    #[must_use]
    pub fn quote_str(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len() + 2);
        escaped.push('\'');
        for c in value.chars() {
            match c {
                '\'' => escaped.push_str("''"),
                '\\' if self.backslash_escapes => escaped.push_str("\\\\"),
                _ => escaped.push(c),
            }
        }
        escaped.push('\'');
        escaped
    }

    /// Renders a value as a SQL literal.
    ///
    /// Only text is escaped; other values are rendered as they are and
    /// should normally be bound as parameters instead.
    #[must_use]
    pub fn quote_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Text(s) => self.quote_str(s),
            SqlValue::Bool(b) => {
                let (t, f) = self.bool_literals;
                (if *b { t } else { f }).to_string()
            }
            SqlValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                let suffix = match self.blob_hex_prefix {
                    "0x" => "",
                    "HEXTORAW('" => "')",
                    _ => "'",
                };
                format!("{}{hex}{suffix}", self.blob_hex_prefix)
            }
            other => other.to_sql_inline(),
        }
    }

    /// Expands `{{table}}`, `{{%table}}` and `[[column]]` tokens.
    ///
    /// `%` is replaced with `table_prefix`.
    #[must_use]
    pub fn quote_sql(&self, sql: &str, table_prefix: &str) -> String {
        static TOKENS: OnceLock<Regex> = OnceLock::new();
        let re = TOKENS.get_or_init(|| {
            Regex::new(r"(\{\{(%?[\w\-\. ]+%?)\}\}|\[\[([\w\-\. ]+)\]\])")
                .expect("static regex is valid")
        });
        re.replace_all(sql, |caps: &regex::Captures<'_>| {
            if let Some(column) = caps.get(3) {
                self.quote_column_name(column.as_str())
            } else {
                let table = caps.get(2).map_or("", |m| m.as_str());
                self.quote_table_name(&table.replace('%', table_prefix))
            }
        })
        .into_owned()
    }
}

fn wrap(name: &str, open: char, close: char) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(open);
    for c in name.chars() {
        if c == close {
            quoted.push(close);
        }
        quoted.push(c);
    }
    quoted.push(close);
    quoted
}

fn unwrap(name: &str, (open, close): (char, char)) -> String {
    let trimmed = name.trim();
    if trimmed.len() >= 2 && trimmed.starts_with(open) && trimmed.ends_with(close) {
        let inner = &trimmed[open.len_utf8()..trimmed.len() - close.len_utf8()];
        let doubled: String = [close, close].iter().collect();
        inner.replace(&doubled, &close.to_string())
    } else {
        name.to_string()
    }
}

/// Splits on `.` outside quoted segments. Returns `None` for an empty
/// segment.
fn split_parts(name: &str, (open, close): (char, char)) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in name.char_indices() {
        if quoted {
            if c == close {
                quoted = false;
            }
        } else if c == open {
            quoted = true;
        } else if c == '.' {
            parts.push(&name[start..i]);
            start = i + 1;
        }
    }
    parts.push(&name[start..]);
    if parts.iter().any(|p| p.trim().is_empty()) {
        return None;
    }
    Some(parts)
}

fn rsplit_outside_quotes(name: &str, quote: (char, char)) -> Option<(&str, &str)> {
    let parts = split_parts(name, quote);
    match parts {
        Some(parts) if parts.len() > 1 => {
            let last = parts[parts.len() - 1];
            let prefix_len = name.len() - last.len() - 1;
            Some((&name[..prefix_len], last))
        }
        Some(_) => None,
        None if name.contains('.') => Some(("", "")),
        None => None,
    }
}

/// Splits `table alias` and `table AS alias`.
fn split_alias(name: &str) -> Option<(&str, &str)> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.as_slice() {
        [table, alias] => Some((table, alias)),
        [table, kw, alias] if kw.eq_ignore_ascii_case("as") => Some((table, alias)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> [Quoter; 5] {
        [
            Quoter::sqlite(),
            Quoter::mysql(),
            Quoter::postgres(),
            Quoter::mssql(),
            Quoter::oracle(),
        ]
    }

    #[test]
    fn test_quote_then_unquote_returns_identifier() {
        for quoter in all() {
            for name in ["id", "user_name", "Mixed Case", "a-b"] {
                let quoted = quoter.quote_simple_column_name(name);
                assert_ne!(quoted, name);
                assert_eq!(quoter.unquote_simple_column_name(&quoted), name);
                let quoted = quoter.quote_simple_table_name(name);
                assert_eq!(quoter.unquote_simple_table_name(&quoted), name);
            }
        }
    }

    #[test]
    fn test_quoting_is_idempotent() {
        for quoter in all() {
            let once = quoter.quote_simple_column_name("name");
            assert_eq!(quoter.quote_simple_column_name(&once), once);
            let once = quoter.quote_table_name("public.customer");
            assert_eq!(quoter.quote_table_name(&once), once);
        }
    }

    #[test]
    fn test_wildcard_is_not_quoted() {
        for quoter in all() {
            assert_eq!(quoter.quote_simple_column_name("*"), "*");
        }
        assert_eq!(Quoter::mysql().quote_column_name("t.*"), "`t`.*");
    }

    #[test]
    fn test_quote_table_name_per_dialect() {
        assert_eq!(Quoter::mysql().quote_table_name("db.customer"), "`db`.`customer`");
        assert_eq!(
            Quoter::postgres().quote_table_name("public.customer"),
            "\"public\".\"customer\""
        );
        assert_eq!(
            Quoter::mssql().quote_simple_table_name("dbo.customer"),
            "[dbo].[customer]"
        );
        assert_eq!(Quoter::sqlite().quote_simple_table_name("main.customer"), "`main.customer`");
    }

    #[test]
    fn test_quote_table_name_with_alias() {
        assert_eq!(Quoter::postgres().quote_table_name("customer c"), "\"customer\" \"c\"");
        assert_eq!(
            Quoter::mysql().quote_table_name("customer AS c"),
            "`customer` `c`"
        );
    }

    #[test]
    fn test_expressions_are_left_alone() {
        let q = Quoter::postgres();
        assert_eq!(q.quote_column_name("COUNT(*)"), "COUNT(*)");
        assert_eq!(q.quote_table_name("(SELECT 1)"), "(SELECT 1)");
        assert_eq!(q.quote_table_name("{{%customer}}"), "{{%customer}}");
    }

    #[test]
    fn test_quote_column_name_with_table_prefix() {
        assert_eq!(
            Quoter::postgres().quote_column_name("customer.name"),
            "\"customer\".\"name\""
        );
        assert_eq!(
            Quoter::mssql().quote_column_name("dbo.customer.name"),
            "[dbo].[customer].[name]"
        );
    }

    #[test]
    fn test_malformed_names_are_returned_unchanged() {
        for quoter in all() {
            assert_eq!(quoter.quote_table_name("a..b"), "a..b");
            assert_eq!(quoter.get_table_name_parts(".table", false), vec![".table"]);
        }
        assert_eq!(Quoter::mssql().quote_simple_table_name("a..b"), "a..b");
    }

    #[test]
    fn test_sqlite_table_name_parts_keep_last_two_segments() {
        let q = Quoter::sqlite();
        assert_eq!(q.get_table_name_parts("main.customer", false), vec!["main", "customer"]);
        assert_eq!(
            q.get_table_name_parts("extra.main.customer", false),
            vec!["main", "customer"]
        );
        assert_eq!(
            q.get_table_name_parts("`main`.`customer`.`id`", true),
            vec!["customer", "id"]
        );
    }

    #[test]
    fn test_table_name_parts_with_column() {
        let q = Quoter::postgres();
        assert_eq!(
            q.get_table_name_parts("\"public\".\"customer\".\"id\"", true),
            vec!["public", "customer", "id"]
        );
        assert_eq!(
            q.get_table_name_parts("a.public.customer", false),
            vec!["public", "customer"]
        );
        assert_eq!(
            Quoter::mssql().get_table_name_parts("[cat].[dbo].[t]", false),
            vec!["cat", "dbo", "t"]
        );
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(Quoter::postgres().quote_value(&SqlValue::Text("it's".into())), "'it''s'");
        assert_eq!(
            Quoter::mysql().quote_value(&SqlValue::Text("a\\b'c".into())),
            "'a\\\\b''c'"
        );
        assert_eq!(Quoter::sqlite().quote_value(&SqlValue::Int(42)), "42");
        assert_eq!(Quoter::postgres().quote_value(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(Quoter::mssql().quote_value(&SqlValue::Bool(true)), "1");
        assert_eq!(Quoter::mssql().quote_value(&SqlValue::Blob(vec![0xAB])), "0xAB");
        assert_eq!(Quoter::sqlite().quote_value(&SqlValue::Null), "NULL");
    }

    #[test]
    fn test_quote_sql_expands_tokens() {
        let q = Quoter::mysql();
        assert_eq!(
            q.quote_sql("SELECT [[name]] FROM {{%customer}} WHERE [[t.id]] = 1", "tbl_"),
            "SELECT `name` FROM `tbl_customer` WHERE `t`.`id` = 1"
        );
        assert_eq!(q.quote_sql("SELECT 1 FROM {{dual}}", ""), "SELECT 1 FROM `dual`");
    }
}
