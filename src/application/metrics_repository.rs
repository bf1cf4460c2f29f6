// Repository trait for metric storage backends
use crate::domain::metadata::ObjectMeta;
use crate::domain::metric::{ListMetricsRequest, MetricMap, ResourceKind};
use async_trait::async_trait;

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Read the metrics of `request.kind`, sorted by the requested order with the limit applied.
    ///
    /// Any backend failure fails the whole read; partial results are never returned.
    async fn list_metrics(&self, request: &ListMetricsRequest) -> anyhow::Result<MetricMap>;

    async fn create_metrics(&self, metrics: &MetricMap) -> anyhow::Result<()>;

    /// Drop every stored series of the given objects.
    async fn delete_metrics(&self, kind: ResourceKind, object_metas: &[ObjectMeta]) -> anyhow::Result<()>;
}
