// Translation between wire messages and domain requests
use crate::api::common::{self as wire, aggregate_function, order};
use crate::api::metrics::{ListMetricsRequest as WireListRequest, ObjectMetric};
use crate::application::assembler::domain_metric_type;
use crate::domain::metric::{
    ApplicationSelector, DomainMetric, ListMetricsRequest, MetricMap, ResourceKind, Sample,
};
use crate::domain::query_condition::{AggregateFunction, Order, QueryCondition};

fn aggregate_from_code(code: i32) -> AggregateFunction {
    match code {
        aggregate_function::MAX => AggregateFunction::Max,
        aggregate_function::AVG => AggregateFunction::Avg,
        aggregate_function::MIN => AggregateFunction::Min,
        aggregate_function::SUM => AggregateFunction::Sum,
        aggregate_function::COUNT => AggregateFunction::Count,
        aggregate_function::MODE => AggregateFunction::Mode,
        aggregate_function::NONE => AggregateFunction::None,
        other => {
            tracing::warn!("unknown aggregate function code {}, using none", other);
            AggregateFunction::None
        }
    }
}

fn order_from_code(code: i32) -> Order {
    match code {
        order::DESC => Order::Desc,
        order::ASC => Order::Asc,
        other => {
            tracing::warn!("unknown order code {}, using ascending", other);
            Order::Asc
        }
    }
}

fn timestamp(field: &str, value: Option<&wire::Timestamp>) -> Option<chrono::DateTime<chrono::Utc>> {
    let value = value?;
    let time = value.to_datetime();
    if time.is_none() {
        tracing::warn!("ignoring malformed {}: {:?}", field, value);
    }
    time
}

/// A step must resolve to whole seconds to size an aggregation window.
fn step_duration(value: &wire::Duration) -> Option<std::time::Duration> {
    let Some(step) = value.to_std() else {
        tracing::warn!("ignoring malformed step: {:?}", value);
        return None;
    };
    if step.as_secs() == 0 {
        tracing::warn!("ignoring step shorter than one second: {:?}", value);
        return None;
    }
    Some(step)
}

/// Missing condition yields the zero-value condition. Malformed times and
/// steps are dropped with a warning rather than rejected.
pub fn query_condition_from_api(condition: Option<&wire::QueryCondition>) -> QueryCondition {
    let Some(condition) = condition else {
        return QueryCondition::default();
    };

    let mut result = QueryCondition {
        timestamp_order: order_from_code(condition.order),
        limit: usize::try_from(condition.limit).unwrap_or(usize::MAX),
        ..Default::default()
    };

    if let Some(range) = &condition.time_range {
        result.start_time = timestamp("start time", range.start_time.as_ref());
        result.end_time = timestamp("end time", range.end_time.as_ref());
        if let Some(step) = range.step.as_ref().and_then(step_duration) {
            result = result.with_step(step);
        }
        result = result.with_aggregation(aggregate_from_code(range.aggregate_function));
    }

    result
}

pub fn list_request_from_api(kind: ResourceKind, request: &WireListRequest) -> ListMetricsRequest {
    let mut result = ListMetricsRequest::new(kind, query_condition_from_api(request.query_condition.as_ref()))
        .with_object_metas(request.object_metas.clone());
    result.applications = request
        .applications
        .iter()
        .map(|app| ApplicationSelector {
            object_meta: app.object_meta.clone(),
            pod_names: app.pod_names.clone(),
        })
        .collect();
    result
}

/// Inbound metrics; samples with malformed timestamps are dropped with a warning.
pub fn metric_map_from_api(kind: ResourceKind, metrics: &[ObjectMetric]) -> MetricMap {
    let mut map = MetricMap::new(kind);
    for object in metrics {
        let mut metric = DomainMetric::new(kind, object.object_meta.clone());
        for data in &object.metric_data {
            let metric_type = domain_metric_type(kind, data.metric_type);
            for sample in &data.data {
                if let Some(time) = timestamp("sample time", Some(&sample.time)) {
                    metric.add_sample(metric_type, Sample::new(time, sample.num_value.clone()));
                }
            }
        }
        map.add(metric);
    }
    map
}
