// InfluxQL statement builder
use crate::domain::query_condition::{AggregateFunction, Order, QueryCondition};
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Column alias, empty for none.
    pub target: String,
}

/// InfluxQL counterpart of an aggregation-over-time function.
pub fn influx_function(function: AggregateFunction) -> Option<&'static str> {
    match function {
        AggregateFunction::None => None,
        AggregateFunction::Max => Some("max"),
        AggregateFunction::Min => Some("min"),
        AggregateFunction::Avg => Some("mean"),
        AggregateFunction::Sum => Some("sum"),
        AggregateFunction::Count => Some("count"),
        AggregateFunction::Mode => Some("mode"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub query_condition: QueryCondition,
    pub measurement: String,
    pub selected_fields: Vec<String>,
    pub group_by_tags: Vec<String>,
    pub function: Option<Function>,
    /// (joining operator, condition); the operator of the first entry is ignored.
    where_conditions: Vec<(String, String)>,
    time_conditions: Vec<String>,
    order_clause: Option<String>,
    limit_clause: Option<String>,
}

fn quote_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Statement {
    pub fn new(measurement: impl Into<String>, query_condition: QueryCondition) -> Self {
        Self {
            measurement: measurement.into(),
            query_condition,
            ..Default::default()
        }
    }

    /// `"key"<op>'value'`; empty values add nothing.
    pub fn append_where_clause(&mut self, operator: &str, key: &str, op: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.where_conditions.push((
            operator.to_string(),
            format!("\"{}\"{}'{}'", key, op, quote_literal(value)),
        ));
    }

    /// One tag matched against several values, joined by `list_operator` and AND-ed with the rest.
    pub fn append_where_clause_by_list(
        &mut self,
        key: &str,
        op: &str,
        list_operator: &str,
        values: &[String],
    ) {
        if values.is_empty() {
            return;
        }
        let condition = values
            .iter()
            .map(|v| format!("\"{}\"{}'{}'", key, op, quote_literal(v)))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", list_operator));
        self.where_conditions
            .push(("AND".to_string(), format!("({})", condition)));
    }

    pub fn append_where_clause_directly(&mut self, operator: &str, condition: &str) {
        if condition.is_empty() {
            return;
        }
        self.where_conditions
            .push((operator.to_string(), condition.to_string()));
    }

    pub fn append_where_clause_with_time(&mut self, op: &str, time: DateTime<Utc>) {
        self.time_conditions
            .push(format!("time{}'{}'", op, format_time(time)));
    }

    pub fn append_where_clause_from_time_condition(&mut self) {
        if let Some(start) = self.query_condition.start_time {
            self.append_where_clause_with_time(">=", start);
        }
        if let Some(end) = self.query_condition.end_time {
            self.append_where_clause_with_time("<=", end);
        }
    }

    pub fn set_function(&mut self, name: &str, target: &str) {
        self.function = Some(Function {
            name: name.to_string(),
            target: target.to_string(),
        });
    }

    pub fn set_order_clause_from_query_condition(&mut self) {
        let direction = match self.query_condition.timestamp_order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        self.order_clause = Some(format!("ORDER BY time {}", direction));
    }

    pub fn set_limit_clause_from_query_condition(&mut self) {
        if self.query_condition.limit > 0 {
            self.limit_clause = Some(format!("LIMIT {}", self.query_condition.limit));
        }
    }

    /// Apply the aggregation-over-time function to `field`, bucketed by the step.
    pub fn set_aggregate_from_query_condition(&mut self, field: &str) {
        let Some(name) = influx_function(self.query_condition.aggregate_over_time_function) else {
            return;
        };

        self.selected_fields = vec![field.to_string()];
        self.set_function(name, field);
        self.group_by_tags
            .push(format!("time({}s)", self.query_condition.step_seconds()));
    }

    /// `("k1"='v1' AND "k2"='v2')` over non-empty values, or an empty string.
    pub fn generate_condition(pairs: &[(&str, &str)], op: &str) -> String {
        let conditions: Vec<String> = pairs
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("\"{}\"='{}'", key, quote_literal(value)))
            .collect();
        Self::generate_condition_by_list(&conditions, op)
    }

    pub fn generate_condition_by_list(conditions: &[String], op: &str) -> String {
        let conditions: Vec<&str> = conditions
            .iter()
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .collect();
        if conditions.is_empty() {
            return String::new();
        }
        format!("({})", conditions.join(&format!(" {} ", op)))
    }

    pub fn has_where_clause(&self) -> bool {
        !self.where_conditions.is_empty()
    }

    fn condition_clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();

        if !self.where_conditions.is_empty() {
            let mut joined = String::new();
            for (i, (operator, condition)) in self.where_conditions.iter().enumerate() {
                if i > 0 {
                    joined.push(' ');
                    joined.push_str(operator);
                    joined.push(' ');
                }
                joined.push_str(condition);
            }
            clauses.push(format!("WHERE ({})", joined));
        }

        for condition in &self.time_conditions {
            let keyword = if clauses.is_empty() { "WHERE" } else { "AND" };
            clauses.push(format!("{} {}", keyword, condition));
        }

        clauses
    }

    pub fn build_query_cmd(&self) -> String {
        let mut fields = if self.selected_fields.is_empty() {
            "*".to_string()
        } else {
            self.selected_fields
                .iter()
                .map(|f| format!("\"{}\"", f))
                .collect::<Vec<_>>()
                .join(",")
        };

        if let Some(function) = &self.function {
            fields = format!("{}({})", function.name, fields);
            if !function.target.is_empty() {
                fields = format!("{} AS \"{}\"", fields, function.target);
            }
        }

        let mut parts = vec![format!("SELECT {} FROM \"{}\"", fields, self.measurement)];
        parts.extend(self.condition_clauses());

        if !self.group_by_tags.is_empty() {
            let tags = self
                .group_by_tags
                .iter()
                .map(|t| {
                    if t.starts_with("time(") {
                        t.clone()
                    } else {
                        format!("\"{}\"", t)
                    }
                })
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("GROUP BY {}", tags));
        }
        if let Some(order) = &self.order_clause {
            parts.push(order.clone());
        }
        if let Some(limit) = &self.limit_clause {
            parts.push(limit.clone());
        }

        parts.join(" ")
    }

    pub fn build_drop_cmd(&self) -> String {
        let mut parts = vec![format!("DROP SERIES FROM \"{}\"", self.measurement)];
        parts.extend(self.condition_clauses());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_full_query() {
        let condition = QueryCondition {
            start_time: DateTime::from_timestamp(1_577_836_800, 0),
            timestamp_order: Order::Desc,
            limit: 10,
            ..Default::default()
        };
        let mut statement = Statement::new("node", condition);
        statement.append_where_clause_by_list("name", "=", "OR", &names(&["n1", "n2"]));
        statement.append_where_clause("AND", "metric_type", "=", "memory_usage_bytes");
        statement.append_where_clause_from_time_condition();
        statement.set_order_clause_from_query_condition();
        statement.set_limit_clause_from_query_condition();

        assert_eq!(
            statement.build_query_cmd(),
            r#"SELECT * FROM "node" WHERE (("name"='n1' OR "name"='n2') AND "metric_type"='memory_usage_bytes') AND time>='2020-01-01T00:00:00Z' ORDER BY time DESC LIMIT 10"#
        );
    }

    #[test]
    fn test_defaults_and_time_only() {
        let condition = QueryCondition {
            end_time: DateTime::from_timestamp(60, 0),
            ..Default::default()
        };
        let mut statement = Statement::new("pod", condition);
        statement.append_where_clause("AND", "namespace", "=", "");
        statement.append_where_clause_from_time_condition();
        statement.set_order_clause_from_query_condition();
        statement.set_limit_clause_from_query_condition();

        assert_eq!(
            statement.build_query_cmd(),
            r#"SELECT * FROM "pod" WHERE time<='1970-01-01T00:01:00Z' ORDER BY time ASC"#
        );
    }

    #[test]
    fn test_aggregate_groups_by_step() {
        let condition = QueryCondition::default()
            .with_step(Duration::from_secs(60))
            .with_aggregation(AggregateFunction::Avg);
        let mut statement = Statement::new("node", condition);
        statement.group_by_tags = names(&["name"]);
        statement.set_aggregate_from_query_condition("value");

        assert_eq!(
            statement.build_query_cmd(),
            r#"SELECT mean("value") AS "value" FROM "node" GROUP BY "name",time(60s)"#
        );
    }

    #[test]
    fn test_no_aggregation_leaves_fields() {
        let mut statement = Statement::new("node", QueryCondition::default());
        statement.set_aggregate_from_query_condition("value");
        assert!(statement.function.is_none());
        assert_eq!(statement.build_query_cmd(), r#"SELECT * FROM "node""#);
    }

    #[test]
    fn test_generate_condition_skips_empty_values() {
        let condition = Statement::generate_condition(&[("name", "a"), ("namespace", ""), ("uid", "u1")], "AND");
        assert_eq!(condition, r#"("name"='a' AND "uid"='u1')"#);
        assert_eq!(Statement::generate_condition(&[("name", "")], "AND"), "");

        let any = Statement::generate_condition_by_list(&[condition, r#"("name"='b')"#.to_string()], "OR");
        assert_eq!(any, r#"(("name"='a' AND "uid"='u1') OR ("name"='b'))"#);
    }

    #[test]
    fn test_values_are_escaped() {
        let mut statement = Statement::new("pod", QueryCondition::default());
        statement.append_where_clause("AND", "name", "=", "it's");
        assert_eq!(statement.build_query_cmd(), r#"SELECT * FROM "pod" WHERE ("name"='it\'s')"#);
    }

    #[test]
    fn test_drop_cmd() {
        let mut statement = Statement::new("container", QueryCondition::default());
        assert!(!statement.has_where_clause());
        statement.append_where_clause("AND", "pod_name", "=", "web-0");
        assert!(statement.has_where_clause());
        statement.append_where_clause("OR", "pod_name", "=", "web-1");

        assert_eq!(
            statement.build_drop_cmd(),
            r#"DROP SERIES FROM "container" WHERE ("pod_name"='web-0' OR "pod_name"='web-1')"#
        );
    }
}
