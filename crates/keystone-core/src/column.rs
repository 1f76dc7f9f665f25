//! Column metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quoter::Quoter;
use crate::value::SqlValue;

/// Abstract column types understood by every dialect's type map.
pub mod types {
    pub const PK: &str = "pk";
    pub const UPK: &str = "upk";
    pub const BIGPK: &str = "bigpk";
    pub const UBIGPK: &str = "ubigpk";
    pub const AUTO: &str = "auto";
    pub const BIGAUTO: &str = "bigauto";
    pub const CHAR: &str = "char";
    pub const STRING: &str = "string";
    pub const TEXT: &str = "text";
    pub const TINYINT: &str = "tinyint";
    pub const SMALLINT: &str = "smallint";
    pub const INTEGER: &str = "integer";
    pub const BIGINT: &str = "bigint";
    pub const FLOAT: &str = "float";
    pub const DOUBLE: &str = "double";
    pub const DECIMAL: &str = "decimal";
    pub const DATETIME: &str = "datetime";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TIME: &str = "time";
    pub const DATE: &str = "date";
    pub const BINARY: &str = "binary";
    pub const BOOLEAN: &str = "boolean";
    pub const MONEY: &str = "money";
    pub const JSON: &str = "json";
}

/// The kind of value a column holds once read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Whole numbers.
    Integer,
    /// Floating point numbers.
    Float,
    /// Booleans.
    Boolean,
    /// Text, and anything without a better representation.
    String,
    /// Raw bytes.
    Binary,
}

impl ValueKind {
    /// Returns the value kind of an abstract column type.
    #[must_use]
    pub fn for_abstract_type(abstract_type: &str) -> Self {
        match abstract_type {
            types::PK
            | types::UPK
            | types::BIGPK
            | types::UBIGPK
            | types::AUTO
            | types::BIGAUTO
            | types::TINYINT
            | types::SMALLINT
            | types::INTEGER
            | types::BIGINT => Self::Integer,
            types::FLOAT | types::DOUBLE => Self::Float,
            types::BOOLEAN => Self::Boolean,
            types::BINARY => Self::Binary,
            _ => Self::String,
        }
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// No action.
    NoAction,
    /// Restrict deletion/update.
    Restrict,
    /// Cascade the operation.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses a catalog rule such as `CASCADE` or `NO ACTION`.
    #[must_use]
    pub fn parse(rule: &str) -> Option<Self> {
        match rule.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g., CURRENT_TIMESTAMP), emitted unquoted.
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of the default value.
    #[must_use]
    pub fn to_sql(&self, quoter: &Quoter) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Boolean(b) => quoter.quote_value(&SqlValue::Bool(*b)),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => quoter.quote_str(s),
            Self::Expression(expr) => expr.clone(),
        }
    }

    /// Returns true for raw expressions.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(self, Self::Expression(_))
    }

    /// Converts the default into a bindable value; expressions have none.
    #[must_use]
    pub fn to_sql_value(&self) -> Option<SqlValue> {
        match self {
            Self::Null => Some(SqlValue::Null),
            Self::Boolean(b) => Some(SqlValue::Bool(*b)),
            Self::Integer(i) => Some(SqlValue::Int(*i)),
            Self::Float(f) => Some(SqlValue::Float(*f)),
            Self::String(s) => Some(SqlValue::Text(s.clone())),
            Self::Expression(_) => None,
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) | Self::Expression(s) => f.write_str(s),
        }
    }
}

impl From<SqlValue> for DefaultValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::Bool(b) => Self::Boolean(b),
            SqlValue::Int(i) => Self::Integer(i),
            SqlValue::Float(f) => Self::Float(f),
            SqlValue::Text(s) => Self::String(s),
            SqlValue::Blob(b) => Self::String(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Metadata of one table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Abstract type (`integer`, `string`, `timestamp`, ...).
    pub abstract_type: String,
    /// Concrete database type as reported by the catalog.
    pub db_type: String,
    /// Kind of value the column holds.
    pub kind: ValueKind,
    /// Display size.
    pub size: Option<u32>,
    /// Numeric precision.
    pub precision: Option<u32>,
    /// Numeric scale.
    pub scale: Option<u32>,
    /// Whether NULL is allowed.
    pub allow_null: bool,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Whether the column is unsigned.
    pub unsigned: bool,
    /// Whether the column generates its own values.
    pub auto_increment: bool,
    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
    /// Allowed values of an enum column.
    pub enum_values: Vec<String>,
    /// Column comment.
    pub comment: Option<String>,
    /// Sequence backing an auto-increment column, on dialects that use one.
    pub sequence_name: Option<String>,
}

impl ColumnSchema {
    /// Creates a nullable column with no default.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        abstract_type: impl Into<String>,
        db_type: impl Into<String>,
    ) -> Self {
        let abstract_type = abstract_type.into();
        Self {
            name: name.into(),
            kind: ValueKind::for_abstract_type(&abstract_type),
            abstract_type,
            db_type: db_type.into(),
            size: None,
            precision: None,
            scale: None,
            allow_null: true,
            default: None,
            unsigned: false,
            auto_increment: false,
            is_primary_key: false,
            enum_values: Vec::new(),
            comment: None,
            sequence_name: None,
        }
    }

    /// Returns true for date and time columns.
    #[must_use]
    pub fn is_time_type(&self) -> bool {
        matches!(
            self.abstract_type.as_str(),
            types::TIMESTAMP | types::DATETIME | types::DATE | types::TIME
        )
    }

    /// Normalizes a raw catalog default into a usable default value.
    ///
    /// `NULL`, `null` and the empty string mean "no default".
    /// `CURRENT_TIMESTAMP` on a date/time column becomes an expression so it
    /// is emitted unquoted. Anything else loses one layer of surrounding
    /// quotes and is cast to the column's value kind.
    #[must_use]
    pub fn normalize_default_value(&self, raw: Option<&str>) -> Option<DefaultValue> {
        let raw = raw?.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
            return None;
        }
        if self.is_time_type() && is_current_timestamp(raw) {
            return Some(DefaultValue::Expression(raw.to_string()));
        }
        Some(self.typecast(strip_quotes(raw)))
    }

    /// Casts a textual value to the column's value kind.
    ///
    /// Text that does not parse as the expected kind stays a string.
    #[must_use]
    pub fn typecast(&self, text: &str) -> DefaultValue {
        match self.kind {
            ValueKind::Integer => text
                .parse()
                .map_or_else(|_| DefaultValue::String(text.to_string()), DefaultValue::Integer),
            ValueKind::Float => text
                .parse()
                .map_or_else(|_| DefaultValue::String(text.to_string()), DefaultValue::Float),
            ValueKind::Boolean => SqlValue::Text(text.to_string())
                .as_bool()
                .map_or_else(|| DefaultValue::String(text.to_string()), DefaultValue::Boolean),
            ValueKind::String | ValueKind::Binary => DefaultValue::String(text.to_string()),
        }
    }

    /// Converts a value about to be bound into the column's value kind.
    #[must_use]
    pub fn db_typecast(&self, value: SqlValue) -> SqlValue {
        match (self.kind, value) {
            (ValueKind::Integer, SqlValue::Text(s)) => match s.trim().parse() {
                Ok(n) => SqlValue::Int(n),
                Err(_) => SqlValue::Text(s),
            },
            (ValueKind::Integer, SqlValue::Bool(b)) => SqlValue::Int(i64::from(b)),
            (ValueKind::Float, SqlValue::Text(s)) => match s.trim().parse() {
                Ok(f) => SqlValue::Float(f),
                Err(_) => SqlValue::Text(s),
            },
            #[allow(clippy::cast_precision_loss)]
            (ValueKind::Float, SqlValue::Int(n)) => SqlValue::Float(n as f64),
            (ValueKind::Boolean, v @ (SqlValue::Text(_) | SqlValue::Int(_))) => {
                v.as_bool().map_or(v, SqlValue::Bool)
            }
            (ValueKind::String, SqlValue::Int(n)) => SqlValue::Text(n.to_string()),
            (ValueKind::String, SqlValue::Float(f)) => SqlValue::Text(f.to_string()),
            (_, v) => v,
        }
    }
}

fn is_current_timestamp(raw: &str) -> bool {
    let upper = raw.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix("CURRENT_TIMESTAMP") else {
        return upper == "NOW()";
    };
    rest.is_empty()
        || (rest.starts_with('(')
            && rest.ends_with(')')
            && rest[1..rest.len() - 1].chars().all(|c| c.is_ascii_digit()))
}

/// Removes one layer of matching single or double quotes.
fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'\'' || first == b'"') && bytes[bytes.len() - 1] == first {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(abstract_type: &str) -> ColumnSchema {
        ColumnSchema::new("c", abstract_type, abstract_type)
    }

    #[test]
    fn test_null_spellings_normalize_to_no_default() {
        let col = column(types::STRING);
        assert_eq!(col.normalize_default_value(None), None);
        assert_eq!(col.normalize_default_value(Some("null")), None);
        assert_eq!(col.normalize_default_value(Some("NULL")), None);
        assert_eq!(col.normalize_default_value(Some("")), None);
    }

    #[test]
    fn test_current_timestamp_on_timestamp_column_is_expression() {
        let col = column(types::TIMESTAMP);
        let default = col.normalize_default_value(Some("CURRENT_TIMESTAMP"));
        assert_eq!(
            default,
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
        );
        assert!(default.unwrap().is_expression());
        assert!(col
            .normalize_default_value(Some("current_timestamp(3)"))
            .unwrap()
            .is_expression());
    }

    #[test]
    fn test_current_timestamp_on_string_column_is_plain_string() {
        let col = column(types::STRING);
        assert_eq!(
            col.normalize_default_value(Some("CURRENT_TIMESTAMP")),
            Some(DefaultValue::String("CURRENT_TIMESTAMP".into()))
        );
    }

    #[test]
    fn test_quotes_are_trimmed_and_value_typecast() {
        assert_eq!(
            column(types::STRING).normalize_default_value(Some("'hello'")),
            Some(DefaultValue::String("hello".into()))
        );
        assert_eq!(
            column(types::INTEGER).normalize_default_value(Some("'42'")),
            Some(DefaultValue::Integer(42))
        );
        assert_eq!(
            column(types::DOUBLE).normalize_default_value(Some("1.5")),
            Some(DefaultValue::Float(1.5))
        );
        assert_eq!(
            column(types::BOOLEAN).normalize_default_value(Some("1")),
            Some(DefaultValue::Boolean(true))
        );
        assert_eq!(
            column(types::INTEGER).normalize_default_value(Some("nextval('seq')")),
            Some(DefaultValue::String("nextval('seq')".into()))
        );
    }

    #[test]
    fn test_db_typecast() {
        let int_col = column(types::INTEGER);
        assert_eq!(int_col.db_typecast(SqlValue::Text("42".into())), SqlValue::Int(42));
        assert_eq!(
            int_col.db_typecast(SqlValue::Text("abc".into())),
            SqlValue::Text("abc".into())
        );
        assert_eq!(int_col.db_typecast(SqlValue::Null), SqlValue::Null);
        let str_col = column(types::STRING);
        assert_eq!(str_col.db_typecast(SqlValue::Int(7)), SqlValue::Text("7".into()));
        let bool_col = column(types::BOOLEAN);
        assert_eq!(bool_col.db_typecast(SqlValue::Int(0)), SqlValue::Bool(false));
    }

    #[test]
    fn test_default_value_rendering() {
        let q = Quoter::postgres();
        assert_eq!(DefaultValue::String("it's".into()).to_sql(&q), "'it''s'");
        assert_eq!(DefaultValue::Boolean(true).to_sql(&q), "TRUE");
        assert_eq!(DefaultValue::Boolean(true).to_sql(&Quoter::mysql()), "1");
        assert_eq!(DefaultValue::Expression("now()".into()).to_sql(&q), "now()");
    }

    #[test]
    fn test_foreign_key_action_parse() {
        assert_eq!(ForeignKeyAction::parse("no action"), Some(ForeignKeyAction::NoAction));
        assert_eq!(ForeignKeyAction::parse("SET_NULL"), Some(ForeignKeyAction::SetNull));
        assert_eq!(ForeignKeyAction::parse("bogus"), None);
    }
}
