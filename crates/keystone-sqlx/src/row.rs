//! Conversion between sqlx's `Any` driver and keystone values.

use keystone_core::{Row, SqlValue};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row as _};

/// Binds `values` in order.
pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    values: Vec<SqlValue>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(n) => query.bind(n),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Blob(b) => query.bind(b),
        };
    }
    query
}

/// Decodes one column.
///
/// The `Any` driver reports the kind of each value, so the decoders are
/// tried from the narrowest to the widest; NULL decodes through the first.
fn decode_value(row: &AnyRow, index: usize) -> SqlValue {
    match row.try_get::<Option<i64>, _>(index) {
        Ok(Some(n)) => return SqlValue::Int(n),
        Ok(None) => return SqlValue::Null,
        Err(_) => {}
    }
    if let Ok(Some(f)) = row.try_get::<Option<f64>, _>(index) {
        return SqlValue::Float(f);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(index) {
        return SqlValue::Bool(b);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(index) {
        return SqlValue::Text(s);
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return SqlValue::Blob(bytes);
    }
    SqlValue::Null
}

/// Converts a driver row into a keystone [`Row`].
pub(crate) fn decode_row(row: &AnyRow) -> Row {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        decoded.push(column.name(), decode_value(row, index));
    }
    decoded
}
