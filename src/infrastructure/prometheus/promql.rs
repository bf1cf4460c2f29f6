// PromQL expression builder
//
// Every operand of a composite expression is wrapped with the
// aggregation-over-time function before the operands are combined.
use crate::domain::metric::Entity;
use crate::domain::query_condition::{AggregateFunction, QueryCondition};
use crate::error::{DatahubError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const CONTAINER_CPU_USAGE_METRIC: &str =
    "namespace_pod_name_container_name:container_cpu_usage_seconds_total:sum_rate";
pub const CONTAINER_MEMORY_USAGE_METRIC: &str = "container_memory_usage_bytes";
pub const NODE_NUM_CPU_METRIC: &str = "node:node_num_cpu:sum";
pub const NODE_CPU_UTILISATION_METRIC: &str = "node:node_cpu_utilisation:avg1m";
pub const NODE_MEMORY_BYTES_TOTAL_METRIC: &str = "node:node_memory_bytes_total:sum";
pub const NODE_MEMORY_UTILISATION_METRIC: &str = "node:node_memory_utilisation_2:";

pub const LABEL_NAMESPACE: &str = "namespace";
pub const LABEL_POD_NAME: &str = "pod_name";
pub const LABEL_CONTAINER_NAME: &str = "container_name";
pub const LABEL_NODE: &str = "node";

/// `label =~ "a|b"`, or an empty string for an empty name list
pub fn regex_matcher(label: &str, names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    format!(r#"{} =~ "{}""#, label, names.join("|"))
}

/// Comma-joined label matchers placed between the braces of a selector.
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    matchers: Vec<String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal(mut self, label: &str, value: &str) -> Self {
        self.matchers.push(format!(r#"{} = "{}""#, label, value));
        self
    }

    pub fn equal_non_empty(self, label: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.equal(label, value)
    }

    pub fn not_equal(mut self, label: &str, value: &str) -> Self {
        self.matchers.push(format!(r#"{} != "{}""#, label, value));
        self
    }

    pub fn regex(mut self, label: &str, names: &[String]) -> Self {
        let matcher = regex_matcher(label, names);
        if !matcher.is_empty() {
            self.matchers.push(matcher);
        }
        self
    }

    pub fn select(&self, metric: &str) -> String {
        format!("{}{{{}}}", metric, self)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.matchers.join(","))
    }
}

fn over_time_function(function: AggregateFunction) -> Option<&'static str> {
    match function {
        AggregateFunction::Max => Some("max_over_time"),
        AggregateFunction::Avg => Some("avg_over_time"),
        AggregateFunction::Min => Some("min_over_time"),
        AggregateFunction::Sum => Some("sum_over_time"),
        AggregateFunction::Count => Some("count_over_time"),
        AggregateFunction::None | AggregateFunction::Mode => None,
    }
}

pub fn wrap_query_expression(
    expression: &str,
    function: AggregateFunction,
    step_seconds: u64,
) -> Result<String> {
    if function == AggregateFunction::None {
        return Ok(expression.to_string());
    }

    let name = over_time_function(function).ok_or(DatahubError::UnsupportedAggregation(function))?;
    Ok(format!("{}({}[{}s])", name, expression, step_seconds))
}

fn wrap(expression: &str, condition: &QueryCondition) -> Result<String> {
    wrap_query_expression(
        expression,
        condition.aggregate_over_time_function,
        condition.step_seconds(),
    )
}

// An empty namespace selects pods across all namespaces.
fn container_selector(namespace: &str, pod_names: &[String]) -> LabelSelector {
    LabelSelector::new()
        .not_equal(LABEL_POD_NAME, "")
        .not_equal(LABEL_CONTAINER_NAME, "POD")
        .equal_non_empty(LABEL_NAMESPACE, namespace)
        .regex(LABEL_POD_NAME, pod_names)
}

fn container_memory_selector(namespace: &str, pod_names: &[String]) -> LabelSelector {
    LabelSelector::new()
        .not_equal(LABEL_POD_NAME, "")
        .not_equal(LABEL_CONTAINER_NAME, "")
        .not_equal(LABEL_CONTAINER_NAME, "POD")
        .equal_non_empty(LABEL_NAMESPACE, namespace)
        .regex(LABEL_POD_NAME, pod_names)
}

fn namespace_selector(namespace_names: &[String], exclude_empty_container: bool) -> LabelSelector {
    let mut selector = LabelSelector::new().not_equal(LABEL_POD_NAME, "");
    if exclude_empty_container {
        selector = selector.not_equal(LABEL_CONTAINER_NAME, "");
    }
    selector
        .not_equal(LABEL_CONTAINER_NAME, "POD")
        .regex(LABEL_NAMESPACE, namespace_names)
}

pub fn container_cpu_usage_millicores(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &container_selector(namespace, pod_names).select(CONTAINER_CPU_USAGE_METRIC),
        condition,
    )?;
    Ok(format!("1000 * {}", expression))
}

pub fn container_memory_usage_bytes(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    wrap(
        &container_memory_selector(namespace, pod_names).select(CONTAINER_MEMORY_USAGE_METRIC),
        condition,
    )
}

pub fn pod_cpu_usage_millicores(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &container_selector(namespace, pod_names).select(CONTAINER_CPU_USAGE_METRIC),
        condition,
    )?;
    Ok(format!(
        "1000 * sum({}) by ({}, {})",
        expression, LABEL_NAMESPACE, LABEL_POD_NAME
    ))
}

pub fn pod_memory_usage_bytes(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &container_memory_selector(namespace, pod_names).select(CONTAINER_MEMORY_USAGE_METRIC),
        condition,
    )?;
    Ok(format!(
        "sum({}) by ({}, {})",
        expression, LABEL_NAMESPACE, LABEL_POD_NAME
    ))
}

/// Sum over every pod of an application, one series for the whole set
pub fn application_cpu_usage_millicores(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &container_selector(namespace, pod_names).select(CONTAINER_CPU_USAGE_METRIC),
        condition,
    )?;
    Ok(format!("1000 * sum({})", expression))
}

pub fn application_memory_usage_bytes(
    namespace: &str,
    pod_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &container_memory_selector(namespace, pod_names).select(CONTAINER_MEMORY_USAGE_METRIC),
        condition,
    )?;
    Ok(format!("sum({})", expression))
}

pub fn namespace_cpu_usage_millicores(
    namespace_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &namespace_selector(namespace_names, false).select(CONTAINER_CPU_USAGE_METRIC),
        condition,
    )?;
    Ok(format!("1000 * sum({}) by ({})", expression, LABEL_NAMESPACE))
}

pub fn namespace_memory_usage_bytes(
    namespace_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let expression = wrap(
        &namespace_selector(namespace_names, true).select(CONTAINER_MEMORY_USAGE_METRIC),
        condition,
    )?;
    Ok(format!("sum({}) by ({})", expression, LABEL_NAMESPACE))
}

pub fn node_cpu_usage_millicores(node_names: &[String], condition: &QueryCondition) -> Result<String> {
    let selector = LabelSelector::new().regex(LABEL_NODE, node_names);
    let num_cpu = wrap(&selector.select(NODE_NUM_CPU_METRIC), condition)?;
    let utilisation = wrap(&selector.select(NODE_CPU_UTILISATION_METRIC), condition)?;
    Ok(format!("1000 * {} * {}", num_cpu, utilisation))
}

pub fn node_memory_usage_bytes(node_names: &[String], condition: &QueryCondition) -> Result<String> {
    let selector = LabelSelector::new().regex(LABEL_NODE, node_names);
    let total = wrap(&selector.select(NODE_MEMORY_BYTES_TOTAL_METRIC), condition)?;
    let utilisation = wrap(&selector.select(NODE_MEMORY_UTILISATION_METRIC), condition)?;
    Ok(format!("{} * {}", total, utilisation))
}

/// CPU millicores summed over the given nodes, or over every node when empty
pub fn cluster_cpu_usage_millicores(
    node_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let selector = LabelSelector::new().regex(LABEL_NODE, node_names);
    let num_cpu = wrap(&selector.select(NODE_NUM_CPU_METRIC), condition)?;
    let utilisation = wrap(&selector.select(NODE_CPU_UTILISATION_METRIC), condition)?;
    Ok(format!("1000 * sum({} * {})", num_cpu, utilisation))
}

pub fn cluster_memory_usage_bytes(
    node_names: &[String],
    condition: &QueryCondition,
) -> Result<String> {
    let selector = LabelSelector::new().regex(LABEL_NODE, node_names);
    let total = wrap(&selector.select(NODE_MEMORY_BYTES_TOTAL_METRIC), condition)?;
    let utilisation = wrap(&selector.select(NODE_MEMORY_UTILISATION_METRIC), condition)?;
    Ok(format!("sum({} * {})", total, utilisation))
}

/// Guarantee one entity per requested name for aggregate-by-label queries.
///
/// Names missing from the backend response are appended, in request order,
/// as entities with no samples and only the grouping label set.
pub fn complete_entities(mut entities: Vec<Entity>, label: &str, names: &[String]) -> Vec<Entity> {
    let mut found: HashSet<String> = entities
        .iter()
        .map(|e| e.label(label).to_string())
        .collect();

    for name in names {
        if found.insert(name.clone()) {
            entities.push(Entity {
                labels: HashMap::from([(label.to_string(), name.clone())]),
                values: Vec::new(),
            });
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::Sample;
    use chrono::DateTime;
    use std::time::Duration;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn max_over_60s() -> QueryCondition {
        QueryCondition::default()
            .with_step(Duration::from_secs(60))
            .with_aggregation(AggregateFunction::Max)
    }

    #[test]
    fn test_wrap_without_function_is_identity() {
        let expression = r#"container_memory_usage_bytes{namespace = "default"}"#;
        assert_eq!(
            wrap_query_expression(expression, AggregateFunction::None, 60).unwrap(),
            expression
        );
    }

    #[test]
    fn test_wrap_with_function() {
        assert_eq!(
            wrap_query_expression("foo", AggregateFunction::Max, 60).unwrap(),
            "max_over_time(foo[60s])"
        );
        assert_eq!(
            wrap_query_expression("foo", AggregateFunction::Count, 15).unwrap(),
            "count_over_time(foo[15s])"
        );
    }

    #[test]
    fn test_wrap_uses_condition_step() {
        assert_eq!(wrap("foo", &max_over_60s()).unwrap(), "max_over_time(foo[60s])");
    }

    #[test]
    fn test_wrap_unknown_function_fails() {
        let err = wrap_query_expression("foo", AggregateFunction::Mode, 60).unwrap_err();
        assert!(matches!(
            err,
            DatahubError::UnsupportedAggregation(AggregateFunction::Mode)
        ));
    }

    #[test]
    fn test_regex_matcher_joins_names() {
        assert_eq!(regex_matcher("node", &names(&["a", "b"])), r#"node =~ "a|b""#);
        assert_eq!(regex_matcher("node", &names(&["a"])), r#"node =~ "a""#);
        assert_eq!(regex_matcher("node", &[]), "");
    }

    #[test]
    fn test_container_cpu_expression() {
        let expression =
            container_cpu_usage_millicores("default", &names(&["web-0", "web-1"]), &QueryCondition::default())
                .unwrap();
        assert_eq!(
            expression,
            r#"1000 * namespace_pod_name_container_name:container_cpu_usage_seconds_total:sum_rate{pod_name != "",container_name != "POD",namespace = "default",pod_name =~ "web-0|web-1"}"#
        );
    }

    #[test]
    fn test_pod_expression_without_namespace() {
        let expression = pod_memory_usage_bytes("", &[], &QueryCondition::default()).unwrap();
        assert_eq!(
            expression,
            r#"sum(container_memory_usage_bytes{pod_name != "",container_name != "",container_name != "POD"}) by (namespace, pod_name)"#
        );
    }

    #[test]
    fn test_namespace_memory_wraps_before_summing() {
        let expression = namespace_memory_usage_bytes(&names(&["ns1"]), &max_over_60s()).unwrap();
        assert_eq!(
            expression,
            r#"sum(max_over_time(container_memory_usage_bytes{pod_name != "",container_name != "",container_name != "POD",namespace =~ "ns1"}[60s])) by (namespace)"#
        );
    }

    #[test]
    fn test_node_cpu_wraps_each_operand() {
        let expression = node_cpu_usage_millicores(&names(&["n1", "n2"]), &max_over_60s()).unwrap();
        assert_eq!(
            expression,
            r#"1000 * max_over_time(node:node_num_cpu:sum{node =~ "n1|n2"}[60s]) * max_over_time(node:node_cpu_utilisation:avg1m{node =~ "n1|n2"}[60s])"#
        );
    }

    #[test]
    fn test_cluster_memory_sums_product() {
        let expression = cluster_memory_usage_bytes(&[], &QueryCondition::default()).unwrap();
        assert_eq!(
            expression,
            "sum(node:node_memory_bytes_total:sum{} * node:node_memory_utilisation_2:{})"
        );
    }

    #[test]
    fn test_composite_propagates_wrap_failure() {
        let condition = QueryCondition::default().with_aggregation(AggregateFunction::Mode);
        assert!(node_memory_usage_bytes(&names(&["n1"]), &condition).is_err());
    }

    #[test]
    fn test_complete_entities_adds_missing_names() {
        let found = Entity {
            labels: HashMap::from([("namespace".to_string(), "n1".to_string())]),
            values: vec![Sample::new(DateTime::from_timestamp(1, 0).unwrap(), "1")],
        };

        let entities = complete_entities(vec![found], LABEL_NAMESPACE, &names(&["n1", "n2"]));

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].values.len(), 1);
        assert_eq!(entities[1].label(LABEL_NAMESPACE), "n2");
        assert!(entities[1].values.is_empty());
    }

    #[test]
    fn test_complete_entities_ignores_duplicate_requests() {
        let entities = complete_entities(Vec::new(), LABEL_NODE, &names(&["a", "a", "b"]));
        assert_eq!(entities.len(), 2);
    }
}
