// Metrics service - list and create metrics across backends
use crate::api::metrics::{
    CreateMetricsRequest, DeleteMetricsRequest, ListMetricsRequest as WireListRequest,
    ListMetricsResponse, ObjectMetric,
};
use crate::application::assembler::assemble_metric_data;
use crate::application::metrics_repository::MetricsRepository;
use crate::application::requests::{list_request_from_api, metric_map_from_api};
use crate::domain::metric::ResourceKind;
use futures::future::join_all;
use std::sync::Arc;

#[derive(Clone)]
pub struct MetricsService {
    /// Backend serving reads.
    source: Arc<dyn MetricsRepository>,
    /// Backend receiving writes.
    sink: Arc<dyn MetricsRepository>,
}

impl MetricsService {
    pub fn new(source: Arc<dyn MetricsRepository>, sink: Arc<dyn MetricsRepository>) -> Self {
        Self { source, sink }
    }

    pub async fn list_metrics(
        &self,
        kind: ResourceKind,
        request: &WireListRequest,
    ) -> anyhow::Result<ListMetricsResponse> {
        // 1. Translate the wire request
        let request = list_request_from_api(kind, request);

        // 2. Read from the configured source; GPU series only live in InfluxDB
        let repository = match kind {
            ResourceKind::Gpu => &self.sink,
            _ => &self.source,
        };
        let metrics = repository.list_metrics(&request).await?.into_metrics();

        // 3. Assemble every object concurrently, keeping object order
        let assembled = join_all(metrics.iter().map(assemble_metric_data)).await;

        // 4. Build the response, surfacing dropped types as warnings
        let mut response = ListMetricsResponse::default();
        for (metric, assembled) in metrics.into_iter().zip(assembled) {
            let name = &metric.object_meta.name;
            response.warnings.extend(
                assembled
                    .unsupported
                    .iter()
                    .map(|t| format!("{}: metric type {} is not supported", name, t)),
            );
            response.warnings.extend(
                assembled
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}: {}", name, f.metric_type, f.reason)),
            );
            response.metrics.push(ObjectMetric {
                object_meta: metric.object_meta,
                metric_data: assembled.data,
            });
        }

        tracing::debug!(
            "listed {} {} metrics, {} warnings",
            response.metrics.len(),
            kind.measurement(),
            response.warnings.len()
        );
        Ok(response)
    }

    pub async fn create_metrics(
        &self,
        kind: ResourceKind,
        request: &CreateMetricsRequest,
    ) -> anyhow::Result<()> {
        let metrics = metric_map_from_api(kind, &request.metrics);
        if metrics.is_empty() {
            return Ok(());
        }
        self.sink.create_metrics(&metrics).await
    }

    pub async fn delete_metrics(
        &self,
        kind: ResourceKind,
        request: &DeleteMetricsRequest,
    ) -> anyhow::Result<()> {
        // Nothing selected means nothing to drop, never the whole measurement
        if request.object_metas.is_empty() {
            tracing::warn!("delete of {} metrics without object metas ignored", kind.measurement());
            return Ok(());
        }
        self.sink.delete_metrics(kind, &request.object_metas).await
    }
}
