//! Structured query descriptions rendered by the query builder.

use crate::params::Params;
use crate::value::{SqlValue, ToSqlValue};

/// Raw SQL with its own parameters.
///
/// The text is emitted verbatim; its parameters are merged into the
/// statement's parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub sql: String,
    pub params: Params,
}

impl Expression {
    /// Creates an expression without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Creates an expression with parameters.
    #[must_use]
    pub fn with_params(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A value written to a column: either bound or a raw expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Value(SqlValue),
    Expression(Expression),
}

impl<T: ToSqlValue> From<T> for ColumnValue {
    fn from(value: T) -> Self {
        Self::Value(value.to_sql_value())
    }
}

impl From<Expression> for ColumnValue {
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

/// Collects `(column, value)` pairs.
pub fn values<K, V, I>(pairs: I) -> Vec<(String, ColumnValue)>
where
    K: Into<String>,
    V: Into<ColumnValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// The rows fed to an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// One row of column values. Empty means "all defaults".
    Values(Vec<(String, ColumnValue)>),
    /// `INSERT ... SELECT`, with the target columns in select order.
    Select {
        columns: Vec<String>,
        query: Box<Query>,
    },
}

impl InsertSource {
    /// An `INSERT ... SELECT` source.
    #[must_use]
    pub fn select<S: Into<String>>(columns: impl IntoIterator<Item = S>, query: Query) -> Self {
        Self::Select {
            columns: columns.into_iter().map(Into::into).collect(),
            query: Box::new(query),
        }
    }

    /// The target column names.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        match self {
            Self::Values(values) => values.iter().map(|(k, _)| k.as_str()).collect(),
            Self::Select { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }
}

impl From<Vec<(String, ColumnValue)>> for InsertSource {
    fn from(values: Vec<(String, ColumnValue)>) -> Self {
        Self::Values(values)
    }
}

impl<K: Into<String>, V: Into<ColumnValue>, const N: usize> From<[(K, V); N]> for InsertSource {
    fn from(pairs: [(K, V); N]) -> Self {
        Self::Values(values(pairs))
    }
}

/// What an upsert does when a row with the same unique key exists.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertUpdate {
    /// Update every inserted column except the conflict keys.
    All,
    /// Keep the existing row.
    None,
    /// Update exactly these columns.
    Columns(Vec<(String, ColumnValue)>),
}

impl From<bool> for UpsertUpdate {
    fn from(update: bool) -> Self {
        if update {
            Self::All
        } else {
            Self::None
        }
    }
}

/// A WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `col = value` pairs joined with AND; NULL renders `IS NULL`.
    Hash(Vec<(String, ColumnValue)>),
    /// `col IN (...)`; an empty list is always false.
    In(String, Vec<SqlValue>),
    /// `col <op> value`.
    Compare(String, String, ColumnValue),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Raw SQL.
    Raw(Expression),
}

impl Condition {
    /// `column = value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        Self::Hash(vec![(column.into(), value.into())])
    }

    /// Several `column = value` pairs joined with AND.
    pub fn hash<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<ColumnValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Hash(values(pairs))
    }

    /// `column IN (values)`.
    pub fn in_list<V: ToSqlValue>(column: impl Into<String>, list: impl IntoIterator<Item = V>) -> Self {
        Self::In(
            column.into(),
            list.into_iter().map(ToSqlValue::to_sql_value).collect(),
        )
    }

    /// `column <operator> value`, e.g. `Condition::compare("age", ">", 18)`.
    #[must_use]
    pub fn compare(
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<ColumnValue>,
    ) -> Self {
        Self::Compare(column.into(), operator.into(), value.into())
    }

    /// Raw SQL condition.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(Expression::new(sql))
    }

    /// Raw SQL condition with parameters.
    #[must_use]
    pub fn raw_with(sql: impl Into<String>, params: Params) -> Self {
        Self::Raw(Expression::with_params(sql, params))
    }

    /// Combines with another condition using AND.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines with another condition using OR.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates the condition.
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A SELECT description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub select: Vec<String>,
    pub distinct: bool,
    pub from: Vec<String>,
    pub condition: Option<Condition>,
    pub group_by: Vec<String>,
    pub having: Option<Condition>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub params: Params,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the selected columns; none selects `*`.
    #[must_use]
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds a table to FROM.
    #[must_use]
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from.push(table.into());
        self
    }

    /// Replaces the WHERE condition.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Adds a condition to WHERE with AND.
    #[must_use]
    pub fn and_filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    #[must_use]
    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Binds a named parameter used by raw fragments of the query.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl ToSqlValue) -> Self {
        self.params.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_value_conversions() {
        assert_eq!(ColumnValue::from(5_i32), ColumnValue::Value(SqlValue::Int(5)));
        assert_eq!(
            ColumnValue::from(Expression::new("NOW()")),
            ColumnValue::Expression(Expression::new("NOW()"))
        );
    }

    #[test]
    fn test_condition_combinators_flatten() {
        let c = Condition::eq("a", 1).and(Condition::eq("b", 2)).and(Condition::eq("c", 3));
        match c {
            Condition::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_insert_source_column_names() {
        let source = InsertSource::from([("name", "a"), ("email", "b")]);
        assert_eq!(source.column_names(), ["name", "email"]);
        let select = InsertSource::select(["id"], Query::new().from("other"));
        assert_eq!(select.column_names(), ["id"]);
    }

    #[test]
    fn test_upsert_update_from_bool() {
        assert_eq!(UpsertUpdate::from(true), UpsertUpdate::All);
        assert_eq!(UpsertUpdate::from(false), UpsertUpdate::None);
    }
}
