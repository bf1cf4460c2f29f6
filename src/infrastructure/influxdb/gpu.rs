// NVIDIA GPU series, one measurement per metric type
use super::statement::Statement;
use crate::domain::metadata::ObjectMeta;
use crate::domain::metric::MetricType;
use crate::domain::query_condition::QueryCondition;
use std::collections::HashMap;

pub const TAG_HOST: &str = "host";
pub const TAG_UUID: &str = "uuid";
pub const TAG_NAME: &str = "name";

pub const SERIES_TAGS: [&str; 3] = [TAG_HOST, TAG_UUID, TAG_NAME];

/// Exporter measurement of every GPU metric type.
pub const MEASUREMENTS: [(MetricType, &str); 4] = [
    (MetricType::GpuDutyCycle, "nvidia_gpu_duty_cycle"),
    (MetricType::GpuMemoryUsedBytes, "nvidia_gpu_memory_used_bytes"),
    (MetricType::GpuPowerUsageMilliWatts, "nvidia_gpu_power_usage_milliwatts"),
    (MetricType::GpuTemperatureCelsius, "nvidia_gpu_temperature_celsius"),
];

pub fn measurement(metric_type: MetricType) -> Option<&'static str> {
    MEASUREMENTS
        .iter()
        .find(|(t, _)| *t == metric_type)
        .map(|(_, m)| *m)
}

/// A GPU is keyed by model name, device uuid (`uid`) and host (`node_name`).
pub fn object_meta(labels: &HashMap<String, String>) -> ObjectMeta {
    let get = |key: &str| labels.get(key).cloned().unwrap_or_default();
    ObjectMeta {
        name: get(TAG_NAME),
        uid: get(TAG_UUID),
        node_name: get(TAG_HOST),
        ..Default::default()
    }
}

pub fn tags(meta: &ObjectMeta) -> [(&'static str, &str); 3] {
    [
        (TAG_HOST, meta.node_name.as_str()),
        (TAG_UUID, meta.uid.as_str()),
        (TAG_NAME, meta.name.as_str()),
    ]
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for value in values.filter(|v| !v.is_empty()) {
        if !result.iter().any(|r| r == value) {
            result.push(value.to_string());
        }
    }
    result
}

/// Statement over one GPU measurement, filtered by the hosts and uuids of `object_metas`.
///
/// Hosts and uuids are matched independently; a uuid names one device, so
/// combining them only narrows the result.
pub fn statement(measurement: &str, object_metas: &[ObjectMeta], condition: QueryCondition) -> Statement {
    let mut statement = Statement::new(measurement, condition);
    statement.append_where_clause_by_list(
        TAG_HOST,
        "=",
        "OR",
        &distinct(object_metas.iter().map(|m| m.node_name.as_str())),
    );
    statement.append_where_clause_by_list(
        TAG_UUID,
        "=",
        "OR",
        &distinct(object_metas.iter().map(|m| m.uid.as_str())),
    );
    statement
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(host: &str, uuid: &str) -> ObjectMeta {
        ObjectMeta {
            node_name: host.to_string(),
            uid: uuid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_gpu_type_has_a_measurement() {
        for metric_type in MetricType::ALL {
            assert_eq!(measurement(metric_type).is_some(), metric_type.is_gpu());
        }
    }

    #[test]
    fn test_statement_filters_hosts_and_uuids() {
        let metas = vec![gpu("node-1", "GPU-a"), gpu("node-1", ""), gpu("node-2", "GPU-b")];
        let statement = statement("nvidia_gpu_duty_cycle", &metas, QueryCondition::default());

        assert_eq!(
            statement.build_query_cmd(),
            r#"SELECT * FROM "nvidia_gpu_duty_cycle" WHERE (("host"='node-1' OR "host"='node-2') AND ("uuid"='GPU-a' OR "uuid"='GPU-b'))"#
        );
        assert!(!super::statement("nvidia_gpu_duty_cycle", &[], QueryCondition::default()).has_where_clause());
    }

    #[test]
    fn test_identity_from_tags() {
        let labels = HashMap::from([
            (TAG_HOST.to_string(), "node-1".to_string()),
            (TAG_UUID.to_string(), "GPU-a".to_string()),
            (TAG_NAME.to_string(), "Tesla T4".to_string()),
            ("minor_number".to_string(), "0".to_string()),
        ]);

        let meta = object_meta(&labels);
        assert_eq!(meta.node_name, "node-1");
        assert_eq!(meta.uid, "GPU-a");
        assert_eq!(tags(&meta), [(TAG_HOST, "node-1"), (TAG_UUID, "GPU-a"), (TAG_NAME, "Tesla T4")]);
    }
}
