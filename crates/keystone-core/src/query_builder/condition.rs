use super::QueryBuilder;
use crate::params::Params;
use crate::query::{ColumnValue, Condition};
use crate::value::SqlValue;

impl QueryBuilder<'_> {
    /// Renders a WHERE condition, binding its values into `params`.
    ///
    /// An empty condition renders an empty string.
    #[must_use]
    pub fn build_condition(&self, condition: &Condition, params: &mut Params) -> String {
        let quoter = self.quoter();
        match condition {
            Condition::Hash(pairs) => pairs
                .iter()
                .map(|(column, value)| {
                    let quoted = quoter.quote_column_name(column);
                    match value {
                        ColumnValue::Value(SqlValue::Null) => format!("{quoted} IS NULL"),
                        ColumnValue::Value(v) => format!("{quoted}={}", params.bind(v.clone())),
                        ColumnValue::Expression(e) => {
                            params.extend(e.params.clone());
                            format!("{quoted}={}", e.sql)
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join(" AND "),
            Condition::In(column, list) => {
                let quoted = quoter.quote_column_name(column);
                match list.as_slice() {
                    [] => "0=1".to_string(),
                    [SqlValue::Null] => format!("{quoted} IS NULL"),
                    [single] => format!("{quoted}={}", params.bind(single.clone())),
                    many => {
                        let placeholders: Vec<String> =
                            many.iter().map(|v| params.bind(v.clone())).collect();
                        format!("{quoted} IN ({})", placeholders.join(", "))
                    }
                }
            }
            Condition::Compare(column, operator, value) => {
                let rhs = match value {
                    ColumnValue::Value(v) => params.bind(v.clone()),
                    ColumnValue::Expression(e) => {
                        params.extend(e.params.clone());
                        e.sql.clone()
                    }
                };
                format!("{} {operator} {rhs}", quoter.quote_column_name(column))
            }
            Condition::And(parts) => self.join_conditions(parts, "AND", params),
            Condition::Or(parts) => self.join_conditions(parts, "OR", params),
            Condition::Not(inner) => {
                let rendered = self.build_condition(inner, params);
                if rendered.is_empty() {
                    rendered
                } else {
                    format!("NOT ({rendered})")
                }
            }
            Condition::Raw(expression) => {
                params.extend(expression.params.clone());
                expression.sql.clone()
            }
        }
    }

    fn join_conditions(&self, parts: &[Condition], operator: &str, params: &mut Params) -> String {
        let rendered: Vec<String> = parts
            .iter()
            .map(|part| self.build_condition(part, params))
            .filter(|sql| !sql.is_empty())
            .collect();
        match rendered.len() {
            0 => String::new(),
            1 => rendered.into_iter().collect(),
            _ => format!("({})", rendered.join(&format!(") {operator} ("))),
        }
    }
}
