//! Immutable column definition builder.
//!
//! A [`ColumnSchemaBuilder`] describes a column with an abstract type and
//! its constraints. Every fluent call consumes the builder and returns a new
//! value. Rendering produces an abstract DDL fragment such as
//! `string(255) NOT NULL DEFAULT 'x'` that the query builder then resolves
//! through the dialect's type map.

use std::fmt;

use crate::column::{types, DefaultValue};
use crate::dialect::DialectDriver;
use crate::quoter::Quoter;

/// Length, precision or free-form size of a column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Length {
    /// `(n)`
    Size(u32),
    /// `(precision,scale)`
    Precision(u32, u32),
    /// `(anything)`, e.g. an enum value list.
    Raw(String),
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size(n) => write!(f, "({n})"),
            Self::Precision(p, s) => write!(f, "({p},{s})"),
            Self::Raw(s) => write!(f, "({s})"),
        }
    }
}

impl From<u32> for Length {
    fn from(value: u32) -> Self {
        Self::Size(value)
    }
}

impl From<(u32, u32)> for Length {
    fn from((p, s): (u32, u32)) -> Self {
        Self::Precision(p, s)
    }
}

impl From<&str> for Length {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_string())
    }
}

/// Rendering category of an abstract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Primary key types: constraints are implied by the type itself.
    Pk,
    /// Character types.
    String,
    /// Numeric types; the only category rendering `{unsigned}`.
    Numeric,
    /// Date and time types.
    Time,
    /// Everything else.
    Other,
}

impl Category {
    /// Returns the category of an abstract type.
    #[must_use]
    pub fn of(column_type: &str) -> Self {
        match column_type {
            types::PK | types::UPK | types::BIGPK | types::UBIGPK | types::AUTO | types::BIGAUTO => {
                Self::Pk
            }
            types::CHAR | types::STRING | types::TEXT => Self::String,
            types::TINYINT
            | types::SMALLINT
            | types::INTEGER
            | types::BIGINT
            | types::FLOAT
            | types::DOUBLE
            | types::DECIMAL
            | types::MONEY => Self::Numeric,
            types::DATETIME | types::TIMESTAMP | types::TIME | types::DATE => Self::Time,
            _ => Self::Other,
        }
    }
}

/// Segment order of a rendered column definition.
///
/// Templates use the placeholders `{type}`, `{length}`, `{unsigned}`,
/// `{notnull}`, `{unique}`, `{check}`, `{default}`, `{comment}`,
/// `{append}` and `{pos}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFormat {
    /// Template for string, time and other columns.
    pub default: &'static str,
    /// Template for primary key columns.
    pub pk: &'static str,
    /// Template for numeric columns.
    pub numeric: &'static str,
}

impl ColumnFormat {
    /// The common layout, used by PostgreSQL.
    pub const BASE: Self = Self {
        default: "{type}{length}{notnull}{unique}{default}{check}{comment}{append}",
        pk: "{type}{check}{comment}{append}",
        numeric: "{type}{length}{unsigned}{notnull}{unique}{default}{check}{comment}{append}",
    };

    /// Returns the template for `category`.
    #[must_use]
    pub const fn template(&self, category: Category) -> &'static str {
        match category {
            Category::Pk => self.pk,
            Category::Numeric => self.numeric,
            Category::String | Category::Time | Category::Other => self.default,
        }
    }
}

/// Dialect knobs used while rendering a builder.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Segment layout.
    pub format: ColumnFormat,
    /// Literal quoting for defaults and comments.
    pub quoter: &'a Quoter,
    /// Whether `UNSIGNED` exists; if not, unsigned integers are widened.
    pub supports_unsigned: bool,
    /// Whether comments are rendered inline (`COMMENT '...'`).
    pub inline_comment: bool,
    /// Whether `AFTER col` / `FIRST` are rendered.
    pub supports_position: bool,
}

/// Immutable, fluent column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchemaBuilder {
    column_type: String,
    length: Option<Length>,
    not_null: Option<bool>,
    unique: bool,
    check: Option<String>,
    default: Option<DefaultValue>,
    append: Option<String>,
    unsigned: bool,
    comment: Option<String>,
    after: Option<String>,
    first: bool,
}

impl ColumnSchemaBuilder {
    /// Creates a builder for an abstract (or raw dialect) type.
    #[must_use]
    pub fn new(column_type: impl Into<String>) -> Self {
        Self {
            column_type: column_type.into(),
            length: None,
            not_null: None,
            unique: false,
            check: None,
            default: None,
            append: None,
            unsigned: false,
            comment: None,
            after: None,
            first: false,
        }
    }

    /// Sets the length or precision.
    #[must_use]
    pub fn length(self, length: impl Into<Length>) -> Self {
        Self {
            length: Some(length.into()),
            ..self
        }
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub fn not_null(self) -> Self {
        Self {
            not_null: Some(true),
            ..self
        }
    }

    /// Marks the column as explicitly NULL.
    #[must_use]
    pub fn null(self) -> Self {
        Self {
            not_null: Some(false),
            ..self
        }
    }

    /// Marks the column as UNIQUE.
    #[must_use]
    pub fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    /// Adds a CHECK constraint.
    #[must_use]
    pub fn check(self, expression: impl Into<String>) -> Self {
        Self {
            check: Some(expression.into()),
            ..self
        }
    }

    /// Sets a literal default value.
    #[must_use]
    pub fn default_value(self, value: impl Into<DefaultValue>) -> Self {
        Self {
            default: Some(value.into()),
            ..self
        }
    }

    /// Sets a raw SQL default, emitted unquoted.
    #[must_use]
    pub fn default_expression(self, expression: impl Into<String>) -> Self {
        Self {
            default: Some(DefaultValue::Expression(expression.into())),
            ..self
        }
    }

    /// Appends raw SQL after the definition.
    #[must_use]
    pub fn append(self, sql: impl Into<String>) -> Self {
        Self {
            append: Some(sql.into()),
            ..self
        }
    }

    /// Marks a numeric column as unsigned.
    #[must_use]
    pub fn unsigned(self) -> Self {
        Self {
            unsigned: true,
            ..self
        }
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self
        }
    }

    /// Places the column after `column` (MySQL only).
    #[must_use]
    pub fn after(self, column: impl Into<String>) -> Self {
        Self {
            after: Some(column.into()),
            first: false,
            ..self
        }
    }

    /// Places the column first (MySQL only).
    #[must_use]
    pub fn first(self) -> Self {
        Self {
            first: true,
            after: None,
            ..self
        }
    }

    /// Returns the abstract type.
    #[must_use]
    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    /// Returns the length, if any.
    #[must_use]
    pub const fn get_length(&self) -> Option<&Length> {
        self.length.as_ref()
    }

    /// Returns the default, if any.
    #[must_use]
    pub const fn get_default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Returns true if the column was marked unsigned.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    /// Returns true if NOT NULL was requested.
    #[must_use]
    pub fn is_not_null(&self) -> bool {
        self.not_null == Some(true)
    }

    /// Returns the comment, if any.
    #[must_use]
    pub fn get_comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns the rendering category.
    #[must_use]
    pub fn category(&self) -> Category {
        Category::of(&self.column_type)
    }

    /// Renders the abstract definition for `driver`.
    #[must_use]
    pub fn render_for(&self, driver: &dyn DialectDriver) -> String {
        self.render(&driver.column_render_options())
    }

    /// Renders the abstract definition with explicit options.
    #[must_use]
    pub fn render(&self, options: &RenderOptions<'_>) -> String {
        let column_type = if self.unsigned && !options.supports_unsigned {
            widen_unsigned(&self.column_type)
        } else {
            self.column_type.as_str()
        };
        let category = Category::of(column_type);
        let template = options.format.template(category);

        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let Some(len) = rest[start..].find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let token = &rest[start + 1..start + len];
            self.push_segment(&mut out, token, column_type, options);
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        out
    }

    fn push_segment(
        &self,
        out: &mut String,
        token: &str,
        column_type: &str,
        options: &RenderOptions<'_>,
    ) {
        match token {
            "type" => out.push_str(column_type),
            "length" => {
                if let Some(ref length) = self.length {
                    out.push_str(&length.to_string());
                }
            }
            "unsigned" => {
                if self.unsigned && options.supports_unsigned {
                    out.push_str(" UNSIGNED");
                }
            }
            "notnull" => match self.not_null {
                Some(true) => out.push_str(" NOT NULL"),
                Some(false) => out.push_str(" NULL"),
                None => {}
            },
            "unique" => {
                if self.unique {
                    out.push_str(" UNIQUE");
                }
            }
            "check" => {
                if let Some(ref check) = self.check {
                    out.push_str(&format!(" CHECK ({check})"));
                }
            }
            "default" => {
                if let Some(ref default) = self.default {
                    out.push_str(" DEFAULT ");
                    out.push_str(&default.to_sql(options.quoter));
                }
            }
            "comment" => {
                if options.inline_comment {
                    if let Some(ref comment) = self.comment {
                        out.push_str(" COMMENT ");
                        out.push_str(&options.quoter.quote_str(comment));
                    }
                }
            }
            "append" => {
                if let Some(ref append) = self.append {
                    out.push(' ');
                    out.push_str(append);
                }
            }
            "pos" => {
                if options.supports_position {
                    if self.first {
                        out.push_str(" FIRST");
                    } else if let Some(ref after) = self.after {
                        out.push_str(" AFTER ");
                        out.push_str(&options.quoter.quote_column_name(after));
                    }
                }
            }
            other => {
                out.push('{');
                out.push_str(other);
                out.push('}');
            }
        }
    }
}

impl fmt::Display for ColumnSchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoter = Quoter::postgres();
        let options = RenderOptions {
            format: ColumnFormat::BASE,
            quoter: &quoter,
            supports_unsigned: true,
            inline_comment: false,
            supports_position: false,
        };
        f.write_str(&self.render(&options))
    }
}

/// A column type in a DDL call: a builder or a raw definition string.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Builder(ColumnSchemaBuilder),
    Raw(String),
}

impl ColumnType {
    /// Renders the abstract definition for `driver`.
    #[must_use]
    pub fn to_abstract(&self, driver: &dyn DialectDriver) -> String {
        match self {
            Self::Builder(builder) => builder.render_for(driver),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<ColumnSchemaBuilder> for ColumnType {
    fn from(builder: ColumnSchemaBuilder) -> Self {
        Self::Builder(builder)
    }
}

impl From<&str> for ColumnType {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for ColumnType {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// Picks the next wider integer type for dialects without `UNSIGNED`.
fn widen_unsigned(column_type: &str) -> &str {
    match column_type {
        types::TINYINT => types::SMALLINT,
        types::SMALLINT => types::INTEGER,
        types::INTEGER => types::BIGINT,
        types::PK | types::UPK => types::BIGPK,
        types::AUTO => types::BIGAUTO,
        other => other,
    }
}

/// `pk` column, optionally with a display length.
#[must_use]
pub fn primary_key() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::PK)
}

/// `bigpk` column.
#[must_use]
pub fn big_primary_key() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::BIGPK)
}

/// `char(n)` column.
#[must_use]
pub fn char(length: u32) -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::CHAR).length(length)
}

/// `string` column; the default length comes from the type map.
#[must_use]
pub fn string() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::STRING)
}

/// `text` column.
#[must_use]
pub fn text() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::TEXT)
}

/// `tinyint` column.
#[must_use]
pub fn tiny_integer() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::TINYINT)
}

/// `smallint` column.
#[must_use]
pub fn small_integer() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::SMALLINT)
}

/// `integer` column.
#[must_use]
pub fn integer() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::INTEGER)
}

/// `bigint` column.
#[must_use]
pub fn big_integer() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::BIGINT)
}

/// `float` column.
#[must_use]
pub fn float() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::FLOAT)
}

/// `double` column.
#[must_use]
pub fn double() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::DOUBLE)
}

/// `decimal(precision,scale)` column.
#[must_use]
pub fn decimal(precision: u32, scale: u32) -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::DECIMAL).length((precision, scale))
}

/// `datetime` column.
#[must_use]
pub fn date_time() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::DATETIME)
}

/// `timestamp` column.
#[must_use]
pub fn timestamp() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::TIMESTAMP)
}

/// `time` column.
#[must_use]
pub fn time() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::TIME)
}

/// `date` column.
#[must_use]
pub fn date() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::DATE)
}

/// `binary` column.
#[must_use]
pub fn binary() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::BINARY)
}

/// `boolean` column.
#[must_use]
pub fn boolean() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::BOOLEAN)
}

/// `money` column.
#[must_use]
pub fn money() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::MONEY)
}

/// `json` column.
#[must_use]
pub fn json() -> ColumnSchemaBuilder {
    ColumnSchemaBuilder::new(types::JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(format: ColumnFormat, quoter: &Quoter, unsigned: bool) -> RenderOptions<'_> {
        RenderOptions {
            format,
            quoter,
            supports_unsigned: unsigned,
            inline_comment: false,
            supports_position: false,
        }
    }

    #[test]
    fn test_builder_is_immutable() {
        let base = string().length(64);
        let required = base.clone().not_null();
        assert!(!base.is_not_null());
        assert!(required.is_not_null());
        assert_eq!(base.to_string(), "string(64)");
        assert_eq!(required.to_string(), "string(64) NOT NULL");
    }

    #[test]
    fn test_base_format_order() {
        let col = string()
            .length(32)
            .not_null()
            .unique()
            .default_value("x")
            .check("value <> ''")
            .append("COLLATE \"C\"");
        assert_eq!(
            col.to_string(),
            "string(32) NOT NULL UNIQUE DEFAULT 'x' CHECK (value <> '') COLLATE \"C\""
        );
    }

    #[test]
    fn test_primary_key_ignores_nullability_and_defaults() {
        let col = primary_key()
            .length(11)
            .not_null()
            .unique()
            .default_value(1)
            .check("id > 0");
        assert_eq!(col.to_string(), "pk CHECK (id > 0)");
    }

    #[test]
    fn test_unsigned_only_in_numeric_category() {
        let q = Quoter::mysql();
        let opts = options(ColumnFormat::BASE, &q, true);
        assert_eq!(integer().unsigned().not_null().render(&opts), "integer UNSIGNED NOT NULL");
        assert_eq!(string().unsigned().render(&opts), "string");
    }

    #[test]
    fn test_unsigned_widens_when_unsupported() {
        let q = Quoter::mssql();
        let opts = options(ColumnFormat::BASE, &q, false);
        assert_eq!(integer().unsigned().render(&opts), "bigint");
        assert_eq!(small_integer().unsigned().render(&opts), "integer");
        assert_eq!(primary_key().unsigned().render(&opts), "bigpk");
        assert_eq!(big_integer().unsigned().render(&opts), "bigint");
    }

    #[test]
    fn test_default_expression_is_unquoted() {
        let col = timestamp().not_null().default_expression("CURRENT_TIMESTAMP");
        assert_eq!(col.to_string(), "timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP");
        let col = string().default_value(DefaultValue::Null);
        assert_eq!(col.to_string(), "string DEFAULT NULL");
    }

    #[test]
    fn test_decimal_precision() {
        assert_eq!(decimal(10, 2).to_string(), "decimal(10,2)");
    }

    #[test]
    fn test_unknown_template_tokens_are_kept() {
        let q = Quoter::postgres();
        let format = ColumnFormat {
            default: "{type}{bogus}",
            pk: "{type}",
            numeric: "{type}",
        };
        assert_eq!(text().render(&options(format, &q, true)), "text{bogus}");
    }
}
