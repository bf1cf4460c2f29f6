// Metric domain models
use super::metadata::ObjectMeta;
use super::query_condition::{Order, QueryCondition};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One point of a series. The value stays textual until the wire type is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Normalized backend result: a label set and its samples in backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub labels: HashMap<String, String>,
    pub values: Vec<Sample>,
}

impl Entity {
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricType {
    CpuUsageSecondsPercentage,
    MemoryUsageBytes,
    MemoryTotalBytes,
    MemoryAvailableBytes,
    PowerUsageWatts,
    TemperatureCelsius,
    DutyCycle,
    GpuDutyCycle,
    GpuMemoryUsedBytes,
    GpuPowerUsageMilliWatts,
    GpuTemperatureCelsius,
}

impl MetricType {
    pub const ALL: [MetricType; 11] = [
        MetricType::CpuUsageSecondsPercentage,
        MetricType::MemoryUsageBytes,
        MetricType::MemoryTotalBytes,
        MetricType::MemoryAvailableBytes,
        MetricType::PowerUsageWatts,
        MetricType::TemperatureCelsius,
        MetricType::DutyCycle,
        MetricType::GpuDutyCycle,
        MetricType::GpuMemoryUsedBytes,
        MetricType::GpuPowerUsageMilliWatts,
        MetricType::GpuTemperatureCelsius,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CpuUsageSecondsPercentage => "cpu_usage_seconds_percentage",
            MetricType::MemoryUsageBytes => "memory_usage_bytes",
            MetricType::MemoryTotalBytes => "memory_total_bytes",
            MetricType::MemoryAvailableBytes => "memory_available_bytes",
            MetricType::PowerUsageWatts => "power_usage_watts",
            MetricType::TemperatureCelsius => "temperature_celsius",
            MetricType::DutyCycle => "duty_cycle",
            MetricType::GpuDutyCycle => "gpu_duty_cycle",
            MetricType::GpuMemoryUsedBytes => "gpu_memory_used_bytes",
            MetricType::GpuPowerUsageMilliWatts => "gpu_power_usage_milli_watts",
            MetricType::GpuTemperatureCelsius => "gpu_temperature_celsius",
        }
    }

    /// Types reported per GPU device rather than per Kubernetes object.
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            MetricType::GpuDutyCycle
                | MetricType::GpuMemoryUsedBytes
                | MetricType::GpuPowerUsageMilliWatts
                | MetricType::GpuTemperatureCelsius
        )
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown metric type: {0}")]
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetricType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownMetricType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Node,
    Pod,
    Container,
    Namespace,
    Cluster,
    Application,
    /// NVIDIA GPU devices, identified by uuid and host.
    Gpu,
}

impl ResourceKind {
    /// InfluxDB measurement holding this kind's metrics
    pub fn measurement(&self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Pod => "pod",
            ResourceKind::Container => "container",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Application => "application",
            ResourceKind::Gpu => "gpu",
        }
    }
}

/// Metrics of one object, keyed by metric type.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainMetric {
    pub kind: ResourceKind,
    pub object_meta: ObjectMeta,
    pub metrics: BTreeMap<MetricType, Vec<Sample>>,
}

impl DomainMetric {
    pub fn new(kind: ResourceKind, object_meta: ObjectMeta) -> Self {
        Self {
            kind,
            object_meta,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_samples(mut self, metric_type: MetricType, samples: Vec<Sample>) -> Self {
        self.metrics.insert(metric_type, samples);
        self
    }

    pub fn add_sample(&mut self, metric_type: MetricType, sample: Sample) {
        self.metrics.entry(metric_type).or_default().push(sample);
    }

    pub fn merge(&mut self, other: DomainMetric) {
        for (metric_type, samples) in other.metrics {
            self.metrics.entry(metric_type).or_default().extend(samples);
        }
    }

    pub fn sort_by_timestamp(&mut self, order: Order) {
        for samples in self.metrics.values_mut() {
            match order {
                Order::Asc => samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
                Order::Desc => samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            }
        }
    }

    pub fn limit(&mut self, limit: usize) {
        if limit == 0 {
            return;
        }
        for samples in self.metrics.values_mut() {
            samples.truncate(limit);
        }
    }
}

/// Domain metrics of one resource kind, merged by object identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMap {
    pub kind: ResourceKind,
    pub metrics: BTreeMap<ObjectMeta, DomainMetric>,
}

impl MetricMap {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            metrics: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, metric: DomainMetric) {
        match self.metrics.get_mut(&metric.object_meta) {
            Some(existing) => existing.merge(metric),
            None => {
                self.metrics.insert(metric.object_meta.clone(), metric);
            }
        }
    }

    pub fn sort_by_timestamp(&mut self, order: Order) {
        for metric in self.metrics.values_mut() {
            metric.sort_by_timestamp(order);
        }
    }

    pub fn limit(&mut self, limit: usize) {
        for metric in self.metrics.values_mut() {
            metric.limit(limit);
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn into_metrics(self) -> Vec<DomainMetric> {
        self.metrics.into_values().collect()
    }
}

/// An application and the pods that make it up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationSelector {
    pub object_meta: ObjectMeta,
    pub pod_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListMetricsRequest {
    pub kind: ResourceKind,
    pub query_condition: QueryCondition,
    pub object_metas: Vec<ObjectMeta>,
    /// Only read for `ResourceKind::Application`.
    pub applications: Vec<ApplicationSelector>,
}

impl ListMetricsRequest {
    pub fn new(kind: ResourceKind, query_condition: QueryCondition) -> Self {
        Self {
            kind,
            query_condition,
            object_metas: Vec::new(),
            applications: Vec::new(),
        }
    }

    pub fn with_object_metas(mut self, object_metas: Vec<ObjectMeta>) -> Self {
        self.object_metas = object_metas;
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.object_metas
            .iter()
            .filter(|m| !m.name.is_empty())
            .map(|m| m.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_metric_type_parses_its_own_name() {
        for metric_type in MetricType::ALL {
            assert_eq!(metric_type.as_str().parse::<MetricType>(), Ok(metric_type));
        }
        assert_eq!(
            "bogus".parse::<MetricType>(),
            Err(UnknownMetricType("bogus".to_string()))
        );
    }

    #[test]
    fn test_gpu_types() {
        let gpu: Vec<_> = MetricType::ALL.into_iter().filter(MetricType::is_gpu).collect();
        assert_eq!(gpu.len(), 4);
        assert!(gpu.iter().all(|t| t.as_str().starts_with("gpu_")));
        assert!(!MetricType::MemoryUsageBytes.is_gpu());
    }

    #[test]
    fn test_metric_map_merges_same_identity() {
        let meta = ObjectMeta::named("n1");
        let mut map = MetricMap::new(ResourceKind::Node);
        map.add(
            DomainMetric::new(ResourceKind::Node, meta.clone())
                .with_samples(MetricType::CpuUsageSecondsPercentage, vec![Sample::new(ts(2), "1")]),
        );
        map.add(
            DomainMetric::new(ResourceKind::Node, meta.clone())
                .with_samples(MetricType::CpuUsageSecondsPercentage, vec![Sample::new(ts(1), "2")])
                .with_samples(MetricType::MemoryUsageBytes, vec![Sample::new(ts(1), "3")]),
        );

        assert_eq!(map.len(), 1);
        let metric = &map.metrics[&meta];
        assert_eq!(metric.metrics[&MetricType::CpuUsageSecondsPercentage].len(), 2);
        assert_eq!(metric.metrics[&MetricType::MemoryUsageBytes].len(), 1);
    }

    #[test]
    fn test_sort_and_limit() {
        let mut metric = DomainMetric::new(ResourceKind::Node, ObjectMeta::named("n1"));
        for secs in [3, 1, 2] {
            metric.add_sample(MetricType::MemoryUsageBytes, Sample::new(ts(secs), secs.to_string()));
        }

        metric.sort_by_timestamp(Order::Desc);
        metric.limit(2);
        let values: Vec<_> = metric.metrics[&MetricType::MemoryUsageBytes]
            .iter()
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(values, vec!["3", "2"]);

        // zero is unbounded, and a limit larger than the series is harmless
        metric.limit(0);
        metric.limit(10);
        assert_eq!(metric.metrics[&MetricType::MemoryUsageBytes].len(), 2);
    }
}
