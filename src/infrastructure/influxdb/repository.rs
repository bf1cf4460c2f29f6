// InfluxDB-backed metrics repository
use super::client::InfluxClient;
use super::gpu;
use super::line_protocol::Point;
use super::rows::pack_rows;
use super::statement::Statement;
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::metadata::ObjectMeta;
use crate::domain::metric::{
    DomainMetric, ListMetricsRequest, MetricMap, MetricType, ResourceKind, Sample,
};
use crate::domain::query_condition::QueryCondition;
use crate::error::{DatahubError, Result};
use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;

pub const METRIC_TYPE_TAG: &str = "metric_type";
pub const VALUE_FIELD: &str = "value";

/// Identity tags followed by the metric type tag.
const SERIES_TAGS: [&str; 7] = [
    "name",
    "namespace",
    "node_name",
    "cluster_name",
    "uid",
    "pod_name",
    METRIC_TYPE_TAG,
];

#[derive(Debug, Clone)]
pub struct InfluxMetricsRepository {
    client: InfluxClient,
    database: String,
    gpu_database: String,
}

/// Restrict `statement` to the given identities. One identity becomes an
/// AND of its tags; several are OR-ed as grouped conditions.
fn append_object_filters(statement: &mut Statement, object_metas: &[&ObjectMeta]) {
    match object_metas {
        [] => {}
        [meta] => {
            for (key, value) in meta.tags() {
                statement.append_where_clause("AND", key, "=", value);
            }
        }
        metas => {
            let filters: Vec<String> = metas
                .iter()
                .map(|meta| Statement::generate_condition(&meta.tags(), "AND"))
                .collect();
            statement.append_where_clause_directly("AND", &Statement::generate_condition_by_list(&filters, "OR"));
        }
    }
}

/// Grouping, aggregation, order and limit shared by every read.
fn finish_select(mut statement: Statement, group_by_tags: &[&str]) -> String {
    // Grouping by series tags keeps LIMIT per series instead of per result set.
    statement.group_by_tags = group_by_tags.iter().map(|t| t.to_string()).collect();
    statement.set_aggregate_from_query_condition(VALUE_FIELD);
    statement.set_order_clause_from_query_condition();
    statement.set_limit_clause_from_query_condition();
    statement.build_query_cmd()
}

fn sample_value(metric: &DomainMetric, metric_type: MetricType, sample: &Sample) -> Result<Option<f64>> {
    let value = sample.value.parse::<f64>().map_err(|_| {
        DatahubError::Sample(format!(
            "{} value {:?} of {} is not numeric",
            metric_type, sample.value, metric.object_meta.name
        ))
    })?;

    if !value.is_finite() {
        tracing::warn!(
            "skipping {} sample {} of {} at {}",
            metric_type,
            sample.value,
            metric.object_meta.name,
            sample.timestamp
        );
        return Ok(None);
    }
    Ok(Some(value))
}

impl InfluxMetricsRepository {
    pub fn new(client: InfluxClient, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
            gpu_database: "gpu".to_string(),
        }
    }

    pub fn with_gpu_database(mut self, database: impl Into<String>) -> Self {
        self.gpu_database = database.into();
        self
    }

    /// Check connectivity and create the metric databases if needed.
    pub async fn ensure_database(&self) -> Result<()> {
        let version = self.client.ping().await?;
        tracing::info!("connected to influxdb {}", version);
        self.client.create_database(&self.database).await?;
        self.client.create_database(&self.gpu_database).await
    }

    fn database_for(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Gpu => &self.gpu_database,
            _ => &self.database,
        }
    }

    fn build_query(request: &ListMetricsRequest) -> String {
        let mut statement = Statement::new(request.kind.measurement(), request.query_condition.clone());

        let metas: Vec<&ObjectMeta> = request
            .object_metas
            .iter()
            .chain(request.applications.iter().map(|app| &app.object_meta))
            .filter(|meta| !meta.is_empty())
            .collect();
        append_object_filters(&mut statement, &metas);
        statement.append_where_clause_from_time_condition();

        finish_select(statement, &SERIES_TAGS)
    }

    fn build_gpu_query(measurement: &str, request: &ListMetricsRequest) -> String {
        let mut statement = gpu::statement(measurement, &request.object_metas, request.query_condition.clone());
        statement.append_where_clause_from_time_condition();
        finish_select(statement, &gpu::SERIES_TAGS)
    }

    async fn read(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let measurement = request.kind.measurement();
        let cmd = Self::build_query(request);
        let results = self.client.query_db(&cmd, &self.database).await?;

        let mut map = MetricMap::new(request.kind);
        for row in pack_rows(&results) {
            for entity in row.into_entities(&SERIES_TAGS, VALUE_FIELD)? {
                let metric_type = match entity.label(METRIC_TYPE_TAG).parse::<MetricType>() {
                    Ok(metric_type) if !metric_type.is_gpu() => metric_type,
                    Ok(metric_type) => {
                        tracing::warn!("skipping {} series in {}, gpu metrics are kept per device", metric_type, measurement);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("skipping series in {}: {}", measurement, e);
                        continue;
                    }
                };

                let meta = ObjectMeta::from_labels(&entity.labels);
                map.add(DomainMetric::new(request.kind, meta).with_samples(metric_type, entity.values));
            }
        }

        tracing::debug!("read {} {} objects from influxdb", map.len(), measurement);
        Ok(map)
    }

    /// One query per exporter measurement, run concurrently.
    async fn read_gpu(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let results = try_join_all(gpu::MEASUREMENTS.iter().map(|(metric_type, measurement)| async move {
            let cmd = Self::build_gpu_query(measurement, request);
            let results = self.client.query_db(&cmd, &self.gpu_database).await?;
            Ok::<_, DatahubError>((*metric_type, results))
        }))
        .await?;

        let mut map = MetricMap::new(ResourceKind::Gpu);
        for (metric_type, results) in results {
            for row in pack_rows(&results) {
                for entity in row.into_entities(&gpu::SERIES_TAGS, VALUE_FIELD)? {
                    let meta = gpu::object_meta(&entity.labels);
                    map.add(DomainMetric::new(ResourceKind::Gpu, meta).with_samples(metric_type, entity.values));
                }
            }
        }

        tracing::debug!("read {} gpus from influxdb", map.len());
        Ok(map)
    }

    /// Measurement and tags a series of `metric_type` is stored under, if it can be stored at all.
    fn series_point(kind: ResourceKind, meta: &ObjectMeta, metric_type: MetricType) -> Option<Point> {
        if kind == ResourceKind::Gpu {
            let mut point = Point::new(gpu::measurement(metric_type)?);
            for (key, value) in gpu::tags(meta) {
                point = point.tag(key, value);
            }
            return Some(point);
        }
        if metric_type.is_gpu() {
            return None;
        }

        let mut point = Point::new(kind.measurement());
        for (key, value) in meta.tags() {
            point = point.tag(key, value);
        }
        Some(point.tag(METRIC_TYPE_TAG, metric_type.as_str()))
    }

    fn to_points(metrics: &MetricMap) -> Result<Vec<Point>> {
        let mut points = Vec::new();
        for metric in metrics.metrics.values() {
            for (metric_type, samples) in &metric.metrics {
                let Some(series) = Self::series_point(metrics.kind, &metric.object_meta, *metric_type) else {
                    tracing::warn!(
                        "{} cannot be stored for {} {}, skipped",
                        metric_type,
                        metrics.kind.measurement(),
                        metric.object_meta.name
                    );
                    continue;
                };

                for sample in samples {
                    let Some(value) = sample_value(metric, *metric_type, sample)? else {
                        continue;
                    };
                    points.push(series.clone().field(VALUE_FIELD, value).timestamp(sample.timestamp));
                }
            }
        }
        Ok(points)
    }

    async fn drop_series(&self, kind: ResourceKind, object_metas: &[ObjectMeta]) -> Result<()> {
        let statements: Vec<Statement> = if kind == ResourceKind::Gpu {
            gpu::MEASUREMENTS
                .iter()
                .map(|(_, measurement)| gpu::statement(measurement, object_metas, QueryCondition::default()))
                .collect()
        } else {
            let mut statement = Statement::new(kind.measurement(), QueryCondition::default());
            let metas: Vec<&ObjectMeta> = object_metas.iter().filter(|meta| !meta.is_empty()).collect();
            append_object_filters(&mut statement, &metas);
            vec![statement]
        };

        // An unfiltered DROP SERIES empties the whole measurement.
        if statements.iter().any(|statement| !statement.has_where_clause()) {
            return Err(DatahubError::Unsupported("dropping series without an object filter"));
        }

        let database = self.database_for(kind);
        for statement in statements {
            self.client.query_db(&statement.build_drop_cmd(), database).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsRepository for InfluxMetricsRepository {
    async fn list_metrics(&self, request: &ListMetricsRequest) -> anyhow::Result<MetricMap> {
        let result = match request.kind {
            ResourceKind::Gpu => self.read_gpu(request).await,
            _ => self.read(request).await,
        };
        let mut map = result.with_context(|| {
            format!("list {} metrics from influxdb failed", request.kind.measurement())
        })?;

        map.sort_by_timestamp(request.query_condition.timestamp_order);
        map.limit(request.query_condition.limit);
        Ok(map)
    }

    async fn create_metrics(&self, metrics: &MetricMap) -> anyhow::Result<()> {
        let points = Self::to_points(metrics)?;
        self.client
            .write_points(&points, self.database_for(metrics.kind))
            .await
            .with_context(|| format!("write {} metrics to influxdb failed", metrics.kind.measurement()))
    }

    async fn delete_metrics(&self, kind: ResourceKind, object_metas: &[ObjectMeta]) -> anyhow::Result<()> {
        self.drop_series(kind, object_metas)
            .await
            .with_context(|| format!("delete {} metrics from influxdb failed", kind.measurement()))
    }
}
