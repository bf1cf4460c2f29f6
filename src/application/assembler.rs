// Concurrent conversion of domain metrics into wire metric data
use crate::api::common::{self as wire, MetricData, Timestamp};
use crate::domain::metric::{DomainMetric, MetricType, ResourceKind, Sample};
use crate::error::{DatahubError, Result};
use tokio::sync::mpsc;

/// Wire type a domain metric type is reported as, `None` when it has no wire form.
pub fn wire_metric_type(metric_type: MetricType) -> Option<wire::MetricType> {
    match metric_type {
        MetricType::CpuUsageSecondsPercentage => Some(wire::MetricType::CpuUsageSecondsPercentage),
        MetricType::MemoryUsageBytes => Some(wire::MetricType::MemoryUsageBytes),
        MetricType::PowerUsageWatts => Some(wire::MetricType::PowerUsageWatts),
        MetricType::TemperatureCelsius => Some(wire::MetricType::TemperatureCelsius),
        MetricType::DutyCycle => Some(wire::MetricType::DutyCycle),
        MetricType::GpuDutyCycle => Some(wire::MetricType::DutyCycle),
        MetricType::GpuMemoryUsedBytes => Some(wire::MetricType::MemoryUsageBytes),
        MetricType::GpuPowerUsageMilliWatts => Some(wire::MetricType::PowerUsageWatts),
        MetricType::GpuTemperatureCelsius => Some(wire::MetricType::TemperatureCelsius),
        MetricType::MemoryTotalBytes | MetricType::MemoryAvailableBytes => None,
    }
}

/// Domain type an inbound wire type is stored as. GPU objects take the GPU
/// variant where one exists; every other kind takes the node-level type.
pub fn domain_metric_type(kind: ResourceKind, metric_type: wire::MetricType) -> MetricType {
    if kind == ResourceKind::Gpu {
        match metric_type {
            wire::MetricType::DutyCycle => return MetricType::GpuDutyCycle,
            wire::MetricType::MemoryUsageBytes => return MetricType::GpuMemoryUsedBytes,
            wire::MetricType::PowerUsageWatts => return MetricType::GpuPowerUsageMilliWatts,
            wire::MetricType::TemperatureCelsius => return MetricType::GpuTemperatureCelsius,
            wire::MetricType::CpuUsageSecondsPercentage => {}
        }
    }

    match metric_type {
        wire::MetricType::CpuUsageSecondsPercentage => MetricType::CpuUsageSecondsPercentage,
        wire::MetricType::MemoryUsageBytes => MetricType::MemoryUsageBytes,
        wire::MetricType::PowerUsageWatts => MetricType::PowerUsageWatts,
        wire::MetricType::TemperatureCelsius => MetricType::TemperatureCelsius,
        wire::MetricType::DutyCycle => MetricType::DutyCycle,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub metric_type: MetricType,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledMetrics {
    /// One entry per converted metric type, in `MetricType` order.
    pub data: Vec<MetricData>,
    pub failures: Vec<ConversionFailure>,
    /// Types present on the object without a wire counterpart.
    pub unsupported: Vec<MetricType>,
}

fn convert_samples(metric_type: wire::MetricType, samples: &[Sample]) -> Result<MetricData> {
    let data = samples
        .iter()
        .map(|sample| {
            sample.value.parse::<f64>().map_err(|_| {
                DatahubError::Sample(format!(
                    "value {:?} at {} is not numeric",
                    sample.value, sample.timestamp
                ))
            })?;
            Ok(wire::Sample {
                time: Timestamp::from_datetime(sample.timestamp),
                num_value: sample.value.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MetricData { metric_type, data })
}

/// Convert every metric type of `metric` on its own task and collect the results.
///
/// Each task reports `(slot, result)`; collection ends once every sender is gone,
/// so a task that dies without reporting leaves its slot empty instead of
/// blocking the receiver.
pub async fn assemble_metric_data(metric: &DomainMetric) -> AssembledMetrics {
    let mut assembled = AssembledMetrics::default();
    let (tx, mut rx) = mpsc::channel(metric.metrics.len().max(1));

    let mut launched = Vec::new();
    for (metric_type, samples) in &metric.metrics {
        let Some(wire_type) = wire_metric_type(*metric_type) else {
            tracing::debug!(
                "{} of {} has no wire metric type, skipped",
                metric_type,
                metric.object_meta.name
            );
            assembled.unsupported.push(*metric_type);
            continue;
        };

        let slot = launched.len();
        launched.push(*metric_type);

        let tx = tx.clone();
        let samples = samples.clone();
        tokio::spawn(async move {
            let result = convert_samples(wire_type, &samples);
            let _ = tx.send((slot, result)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<Result<MetricData>>> = launched.iter().map(|_| None).collect();
    while let Some((slot, result)) = rx.recv().await {
        slots[slot] = Some(result);
    }

    for (metric_type, slot) in launched.into_iter().zip(slots) {
        match slot {
            Some(Ok(data)) => assembled.data.push(data),
            Some(Err(e)) => assembled.failures.push(ConversionFailure {
                metric_type,
                reason: e.to_string(),
            }),
            None => assembled.failures.push(ConversionFailure {
                metric_type,
                reason: "conversion task ended without a result".to_string(),
            }),
        }
    }

    for failure in &assembled.failures {
        tracing::warn!(
            "converting {} of {} failed: {}",
            failure.metric_type,
            metric.object_meta.name,
            failure.reason
        );
    }

    assembled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metadata::ObjectMeta;
    use chrono::DateTime;

    fn samples(values: &[&str]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(DateTime::from_timestamp(i as i64, 0).unwrap(), *v))
            .collect()
    }

    fn node() -> DomainMetric {
        DomainMetric::new(ResourceKind::Node, ObjectMeta::named("n1"))
    }

    #[tokio::test]
    async fn test_known_types_in_declaration_order() {
        let metric = node()
            .with_samples(MetricType::TemperatureCelsius, samples(&["40"]))
            .with_samples(MetricType::CpuUsageSecondsPercentage, samples(&["1", "2"]))
            .with_samples(MetricType::MemoryUsageBytes, samples(&["1024"]));

        let assembled = assemble_metric_data(&metric).await;

        let types: Vec<_> = assembled.data.iter().map(|d| d.metric_type).collect();
        assert_eq!(
            types,
            vec![
                wire::MetricType::CpuUsageSecondsPercentage,
                wire::MetricType::MemoryUsageBytes,
                wire::MetricType::TemperatureCelsius,
            ]
        );
        assert_eq!(assembled.data[0].data.len(), 2);
        assert_eq!(assembled.data[0].data[1].time.seconds, 1);
        assert!(assembled.failures.is_empty());
        assert!(assembled.unsupported.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_type_is_recorded_not_failed() {
        let metric = node().with_samples(MetricType::MemoryTotalBytes, samples(&["1"]));

        let assembled = assemble_metric_data(&metric).await;

        assert!(assembled.data.is_empty());
        assert!(assembled.failures.is_empty());
        assert_eq!(assembled.unsupported, vec![MetricType::MemoryTotalBytes]);
    }

    #[tokio::test]
    async fn test_non_numeric_value_fails_only_its_type() {
        let metric = node()
            .with_samples(MetricType::CpuUsageSecondsPercentage, samples(&["NaN?"]))
            .with_samples(MetricType::MemoryUsageBytes, samples(&["7"]));

        let assembled = assemble_metric_data(&metric).await;

        assert_eq!(assembled.data.len(), 1);
        assert_eq!(assembled.data[0].metric_type, wire::MetricType::MemoryUsageBytes);
        assert_eq!(assembled.failures.len(), 1);
        assert_eq!(assembled.failures[0].metric_type, MetricType::CpuUsageSecondsPercentage);
    }

    #[tokio::test]
    async fn test_empty_series_and_empty_object() {
        let metric = node().with_samples(MetricType::DutyCycle, Vec::new());
        let assembled = assemble_metric_data(&metric).await;
        assert_eq!(assembled.data.len(), 1);
        assert_eq!(assembled.data[0].metric_type, wire::MetricType::DutyCycle);
        assert!(assembled.data[0].data.is_empty());

        assert_eq!(assemble_metric_data(&node()).await, AssembledMetrics::default());
    }

    #[tokio::test]
    async fn test_gpu_object_reports_each_wire_type_once() {
        let gpu = DomainMetric::new(ResourceKind::Gpu, ObjectMeta::named("Tesla T4"))
            .with_samples(MetricType::GpuDutyCycle, samples(&["0.5"]))
            .with_samples(MetricType::GpuMemoryUsedBytes, samples(&["1024"]))
            .with_samples(MetricType::GpuPowerUsageMilliWatts, samples(&["70000"]))
            .with_samples(MetricType::GpuTemperatureCelsius, samples(&["60"]));

        let assembled = assemble_metric_data(&gpu).await;

        let types: Vec<_> = assembled.data.iter().map(|d| d.metric_type).collect();
        assert_eq!(
            types,
            vec![
                wire::MetricType::DutyCycle,
                wire::MetricType::MemoryUsageBytes,
                wire::MetricType::PowerUsageWatts,
                wire::MetricType::TemperatureCelsius,
            ]
        );
    }

    #[test]
    fn test_wire_translation_round_trip() {
        for metric_type in MetricType::ALL {
            let kind = if metric_type.is_gpu() {
                ResourceKind::Gpu
            } else {
                ResourceKind::Node
            };
            if let Some(wire_type) = wire_metric_type(metric_type) {
                assert_eq!(domain_metric_type(kind, wire_type), metric_type);
            }
        }
        assert_eq!(
            domain_metric_type(ResourceKind::Gpu, wire::MetricType::CpuUsageSecondsPercentage),
            MetricType::CpuUsageSecondsPercentage
        );
    }
}
