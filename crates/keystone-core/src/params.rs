//! Named parameter sets.
//!
//! Every placeholder the query builder emits is registered here exactly
//! once. Named keys always carry a leading colon; purely numeric keys are
//! positional (`?`) parameters and are stored as-is.

use serde::{Deserialize, Serialize};

use crate::value::{SqlValue, ToSqlValue};

/// Prefix of the placeholders generated by [`Params::bind`].
pub const PARAM_PREFIX: &str = ":qp";

/// An ordered map from placeholder to bound value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    entries: Vec<(String, SqlValue)>,
}

/// Normalizes a parameter key: `name` and `:name` address the same entry.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    if name.starts_with(':') || name.chars().all(|c| c.is_ascii_digit()) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `value` under a fresh `:qpN` placeholder and returns the
    /// placeholder.
    ///
    /// `N` continues from the current size, skipping names already taken.
    pub fn bind(&mut self, value: impl ToSqlValue) -> String {
        let mut n = self.entries.len();
        let mut name = format!("{PARAM_PREFIX}{n}");
        while self.contains(&name) {
            n += 1;
            name = format!("{PARAM_PREFIX}{n}");
        }
        self.entries.push((name.clone(), value.to_sql_value()));
        name
    }

    /// Sets a named parameter, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl ToSqlValue) {
        let key = normalize_name(name);
        let value = value.to_sql_value();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Sets a named parameter, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl ToSqlValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value bound to `name` (`name` or `:name`).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let key = normalize_name(name);
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Merges `other` into this set; entries of `other` win on conflict.
    pub fn extend(&mut self, other: Self) {
        for (name, value) in other.entries {
            self.insert(&name, value);
        }
    }

    /// Returns the number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(placeholder, value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the positional (`?`) values ordered by their 1-based index.
    #[must_use]
    pub fn positional(&self) -> Vec<&SqlValue> {
        let mut indexed: Vec<(usize, &SqlValue)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
            .collect();
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, v)| v).collect()
    }
}

impl<K: AsRef<str>, V: ToSqlValue> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k.as_ref(), v);
        }
        params
    }
}

impl IntoIterator for Params {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_generates_sequential_placeholders() {
        let mut params = Params::new();
        assert_eq!(params.bind("a"), ":qp0");
        assert_eq!(params.bind("b"), ":qp1");
        assert_eq!(params.get(":qp1"), Some(&SqlValue::Text("b".into())));
    }

    #[test]
    fn test_bind_skips_taken_names() {
        let mut params = Params::new().with("qp1", 5_i64);
        assert_eq!(params.bind(1_i64), ":qp2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_names_with_and_without_colon_are_the_same_key() {
        let mut params = Params::new();
        params.insert("id", 1_i64);
        params.insert(":id", 2_i64);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some(&SqlValue::Int(2)));
    }

    #[test]
    fn test_positional_keys_are_ordered() {
        let params: Params = [("2", "second"), ("1", "first")].into_iter().collect();
        let values = params.positional();
        assert_eq!(values, vec![&SqlValue::Text("first".into()), &SqlValue::Text("second".into())]);
    }
}
