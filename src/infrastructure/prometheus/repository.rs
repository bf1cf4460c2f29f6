// Prometheus-backed metrics repository
use super::client::PrometheusClient;
use super::promql::{self, LABEL_CONTAINER_NAME, LABEL_NAMESPACE, LABEL_NODE, LABEL_POD_NAME};
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::metadata::ObjectMeta;
use crate::domain::metric::{
    ApplicationSelector, DomainMetric, Entity, ListMetricsRequest, MetricMap, MetricType,
    ResourceKind,
};
use crate::domain::query_condition::QueryCondition;
use crate::error::{DatahubError, Result};
use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::time::Duration;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PrometheusRepository {
    client: PrometheusClient,
}

/// Entities of one metric family, tagged with the type they carry.
type Family = (MetricType, Vec<Entity>);

impl PrometheusRepository {
    pub fn new(client: PrometheusClient) -> Self {
        Self { client }
    }

    /// Instant query proving the server answers PromQL.
    pub async fn check_ready(&self) -> Result<()> {
        self.client
            .query("vector(1)", None, Some(READY_TIMEOUT))
            .await?
            .get_entities()
            .map(|_| ())
    }

    async fn query_entities(
        &self,
        expression: Result<String>,
        condition: &QueryCondition,
    ) -> Result<Vec<Entity>> {
        let expression = expression?;
        let response = self
            .client
            .query_range(
                &expression,
                condition.start_time,
                condition.end_time,
                condition.step_time,
            )
            .await?;
        response.get_entities()
    }

    async fn list_node_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let names = request.names();
        let condition = &request.query_condition;

        let (cpu, memory) = tokio::try_join!(
            self.query_entities(promql::node_cpu_usage_millicores(&names, condition), condition),
            self.query_entities(promql::node_memory_usage_bytes(&names, condition), condition),
        )?;

        let families = [
            (MetricType::CpuUsageSecondsPercentage, cpu),
            (MetricType::MemoryUsageBytes, memory),
        ];

        let mut map = MetricMap::new(ResourceKind::Node);
        for (metric_type, entities) in families {
            for entity in promql::complete_entities(entities, LABEL_NODE, &names) {
                let meta = ObjectMeta::named(entity.label(LABEL_NODE));
                map.add(DomainMetric::new(ResourceKind::Node, meta).with_samples(metric_type, entity.values));
            }
        }
        Ok(map)
    }

    async fn list_pod_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let condition = &request.query_condition;
        let groups = group_pods_by_namespace(&request.object_metas, |meta| meta.name.as_str());

        let families = try_join_all(groups.iter().map(|(namespace, pods)| async move {
            let (cpu, memory) = tokio::try_join!(
                self.query_entities(promql::pod_cpu_usage_millicores(namespace, pods, condition), condition),
                self.query_entities(promql::pod_memory_usage_bytes(namespace, pods, condition), condition),
            )?;
            Ok::<_, DatahubError>([
                (MetricType::CpuUsageSecondsPercentage, cpu),
                (MetricType::MemoryUsageBytes, memory),
            ])
        }))
        .await?;

        Ok(collect(ResourceKind::Pod, families.into_iter().flatten(), |entity| {
            ObjectMeta::namespaced(entity.label(LABEL_NAMESPACE), entity.label(LABEL_POD_NAME))
        }))
    }

    async fn list_container_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let condition = &request.query_condition;
        // Containers are selected through their pods.
        let groups = group_pods_by_namespace(&request.object_metas, |meta| {
            if meta.pod_name.is_empty() {
                meta.name.as_str()
            } else {
                meta.pod_name.as_str()
            }
        });

        let families = try_join_all(groups.iter().map(|(namespace, pods)| async move {
            let (cpu, memory) = tokio::try_join!(
                self.query_entities(promql::container_cpu_usage_millicores(namespace, pods, condition), condition),
                self.query_entities(promql::container_memory_usage_bytes(namespace, pods, condition), condition),
            )?;
            Ok::<_, DatahubError>([
                (MetricType::CpuUsageSecondsPercentage, cpu),
                (MetricType::MemoryUsageBytes, memory),
            ])
        }))
        .await?;

        Ok(collect(ResourceKind::Container, families.into_iter().flatten(), |entity| {
            ObjectMeta {
                name: entity.label(LABEL_CONTAINER_NAME).to_string(),
                namespace: entity.label(LABEL_NAMESPACE).to_string(),
                pod_name: entity.label(LABEL_POD_NAME).to_string(),
                ..Default::default()
            }
        }))
    }

    async fn list_namespace_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let names = request.names();
        let condition = &request.query_condition;

        let (cpu, memory) = tokio::try_join!(
            self.query_entities(promql::namespace_cpu_usage_millicores(&names, condition), condition),
            self.query_entities(promql::namespace_memory_usage_bytes(&names, condition), condition),
        )?;

        let families = [
            (MetricType::CpuUsageSecondsPercentage, promql::complete_entities(cpu, LABEL_NAMESPACE, &names)),
            (MetricType::MemoryUsageBytes, promql::complete_entities(memory, LABEL_NAMESPACE, &names)),
        ];

        Ok(collect(ResourceKind::Namespace, families, |entity| {
            ObjectMeta::named(entity.label(LABEL_NAMESPACE))
        }))
    }

    async fn list_cluster_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let condition = &request.query_condition;

        let (cpu, memory) = tokio::try_join!(
            self.query_entities(promql::cluster_cpu_usage_millicores(&[], condition), condition),
            self.query_entities(promql::cluster_memory_usage_bytes(&[], condition), condition),
        )?;

        // A Prometheus instance observes exactly one cluster.
        let cluster = request.object_metas.first().cloned().unwrap_or_default();
        if request.object_metas.len() > 1 {
            tracing::debug!(
                "{} clusters requested, reporting prometheus data as {:?} only",
                request.object_metas.len(),
                cluster.name
            );
        }
        let families = [
            (MetricType::CpuUsageSecondsPercentage, cpu),
            (MetricType::MemoryUsageBytes, memory),
        ];

        Ok(collect(ResourceKind::Cluster, families, |_| cluster.clone()))
    }

    async fn list_application_metrics(&self, request: &ListMetricsRequest) -> Result<MetricMap> {
        let condition = &request.query_condition;

        let results = try_join_all(
            request
                .applications
                .iter()
                .filter(|app| !app.pod_names.is_empty())
                .map(|app| async move {
                    let namespace = app.object_meta.namespace.as_str();
                    let (cpu, memory) = tokio::try_join!(
                        self.query_entities(
                            promql::application_cpu_usage_millicores(namespace, &app.pod_names, condition),
                            condition
                        ),
                        self.query_entities(
                            promql::application_memory_usage_bytes(namespace, &app.pod_names, condition),
                            condition
                        ),
                    )?;
                    Ok::<_, DatahubError>((app, cpu, memory))
                }),
        )
        .await?;

        let mut map = MetricMap::new(ResourceKind::Application);
        for app in request.applications.iter().filter(|app| app.pod_names.is_empty()) {
            tracing::debug!("application {} has no pods, skipping query", app.object_meta.name);
            map.add(DomainMetric::new(ResourceKind::Application, app.object_meta.clone()));
        }
        for (app, cpu, memory) in results {
            add_application_family(&mut map, app, MetricType::CpuUsageSecondsPercentage, cpu);
            add_application_family(&mut map, app, MetricType::MemoryUsageBytes, memory);
        }
        Ok(map)
    }
}

fn add_application_family(
    map: &mut MetricMap,
    app: &ApplicationSelector,
    metric_type: MetricType,
    entities: Vec<Entity>,
) {
    let samples = entities.into_iter().flat_map(|e| e.values).collect();
    map.add(
        DomainMetric::new(ResourceKind::Application, app.object_meta.clone())
            .with_samples(metric_type, samples),
    );
}

/// Pod names per namespace; an empty list selects every pod of the namespace.
/// No object metas means every pod of every namespace.
fn group_pods_by_namespace<'a>(
    object_metas: &'a [ObjectMeta],
    pod_name: impl Fn(&'a ObjectMeta) -> &'a str,
) -> BTreeMap<String, Vec<String>> {
    if object_metas.is_empty() {
        return BTreeMap::from([(String::new(), Vec::new())]);
    }

    // (every pod selected, named pods)
    let mut groups: BTreeMap<String, (bool, Vec<String>)> = BTreeMap::new();
    for meta in object_metas {
        let (all, pods) = groups.entry(meta.namespace.clone()).or_default();
        let name = pod_name(meta);
        if name.is_empty() {
            *all = true;
        } else if !pods.iter().any(|p| p == name) {
            pods.push(name.to_string());
        }
    }

    groups
        .into_iter()
        .map(|(namespace, (all, pods))| (namespace, if all { Vec::new() } else { pods }))
        .collect()
}

fn collect(
    kind: ResourceKind,
    families: impl IntoIterator<Item = Family>,
    identity: impl Fn(&Entity) -> ObjectMeta,
) -> MetricMap {
    let mut map = MetricMap::new(kind);
    for (metric_type, entities) in families {
        for entity in entities {
            let meta = identity(&entity);
            map.add(DomainMetric::new(kind, meta).with_samples(metric_type, entity.values));
        }
    }
    map
}

#[async_trait]
impl MetricsRepository for PrometheusRepository {
    async fn list_metrics(&self, request: &ListMetricsRequest) -> anyhow::Result<MetricMap> {
        let result = match request.kind {
            ResourceKind::Node => self.list_node_metrics(request).await,
            ResourceKind::Pod => self.list_pod_metrics(request).await,
            ResourceKind::Container => self.list_container_metrics(request).await,
            ResourceKind::Namespace => self.list_namespace_metrics(request).await,
            ResourceKind::Cluster => self.list_cluster_metrics(request).await,
            ResourceKind::Application => self.list_application_metrics(request).await,
            ResourceKind::Gpu => Err(DatahubError::Unsupported("reading gpu metrics from prometheus")),
        };

        let mut map = result.with_context(|| {
            format!("list {} metrics from prometheus failed", request.kind.measurement())
        })?;

        map.sort_by_timestamp(request.query_condition.timestamp_order);
        map.limit(request.query_condition.limit);
        Ok(map)
    }

    async fn create_metrics(&self, _metrics: &MetricMap) -> anyhow::Result<()> {
        Err(DatahubError::Unsupported("writing metrics to prometheus").into())
    }

    async fn delete_metrics(&self, _kind: ResourceKind, _object_metas: &[ObjectMeta]) -> anyhow::Result<()> {
        Err(DatahubError::Unsupported("deleting metrics from prometheus").into())
    }
}
