// HTTP request handlers
use crate::api::metrics::{
    CreateMetricsRequest, DeleteMetricsRequest, ListMetricsRequest, ListMetricsResponse,
};
use crate::domain::metric::ResourceKind;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

#[derive(Debug)]
pub enum ApiError {
    UnknownKind(String),
    Backend(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownKind(kind) => (
                StatusCode::BAD_REQUEST,
                format!("unknown resource kind: {}", kind),
            ),
            ApiError::Backend(e) => {
                tracing::error!("request failed: {:#}", e);
                (StatusCode::BAD_GATEWAY, format!("{:#}", e))
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Plural path segment naming a resource kind
pub fn resource_kind(segment: &str) -> Result<ResourceKind, ApiError> {
    match segment {
        "nodes" => Ok(ResourceKind::Node),
        "pods" => Ok(ResourceKind::Pod),
        "containers" => Ok(ResourceKind::Container),
        "namespaces" => Ok(ResourceKind::Namespace),
        "clusters" => Ok(ResourceKind::Cluster),
        "applications" => Ok(ResourceKind::Application),
        "gpus" => Ok(ResourceKind::Gpu),
        other => Err(ApiError::UnknownKind(other.to_string())),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List metrics of one resource kind.
///
/// Conversion problems of single metric types do not fail the request; they
/// come back in `warnings`.
pub async fn list_metrics(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListMetricsRequest>,
) -> Result<Json<ListMetricsResponse>, ApiError> {
    // Validate the kind before touching any backend
    let kind = resource_kind(&kind)?;
    let response = state
        .metrics_service
        .list_metrics(kind, &request)
        .await
        .map_err(ApiError::Backend)?;
    Ok(Json(response))
}

pub async fn create_metrics(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMetricsRequest>,
) -> Result<StatusCode, ApiError> {
    let kind = resource_kind(&kind)?;
    // Writes always land in InfluxDB, whatever the read source
    state
        .metrics_service
        .create_metrics(kind, &request)
        .await
        .map_err(ApiError::Backend)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_metrics(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteMetricsRequest>,
) -> Result<StatusCode, ApiError> {
    let kind = resource_kind(&kind)?;
    state
        .metrics_service
        .delete_metrics(kind, &request)
        .await
        .map_err(ApiError::Backend)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metrics_repository::MetricsRepository;
    use crate::application::metrics_service::MetricsService;
    use crate::domain::metadata::ObjectMeta;
    use crate::domain::metric::{self, MetricMap};
    use async_trait::async_trait;

    struct EmptyRepository;

    #[async_trait]
    impl MetricsRepository for EmptyRepository {
        async fn list_metrics(&self, request: &metric::ListMetricsRequest) -> anyhow::Result<MetricMap> {
            if request.kind == ResourceKind::Cluster {
                anyhow::bail!("prometheus unreachable");
            }
            Ok(MetricMap::new(request.kind))
        }

        async fn create_metrics(&self, _metrics: &MetricMap) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_metrics(&self, kind: ResourceKind, _object_metas: &[ObjectMeta]) -> anyhow::Result<()> {
            if kind == ResourceKind::Cluster {
                anyhow::bail!("influxdb unreachable");
            }
            Ok(())
        }
    }

    fn state() -> Arc<AppState> {
        let repository = Arc::new(EmptyRepository);
        Arc::new(AppState {
            metrics_service: MetricsService::new(repository.clone(), repository),
        })
    }

    #[test]
    fn test_resource_kind_segments() {
        assert_eq!(resource_kind("nodes").unwrap(), ResourceKind::Node);
        assert_eq!(resource_kind("applications").unwrap(), ResourceKind::Application);
        assert_eq!(resource_kind("gpus").unwrap(), ResourceKind::Gpu);
        assert!(matches!(resource_kind("node"), Err(ApiError::UnknownKind(_))));
    }

    #[tokio::test]
    async fn test_list_metrics_ok() {
        let Json(response) = list_metrics(
            Path("pods".to_string()),
            State(state()),
            Json(ListMetricsRequest::default()),
        )
        .await
        .unwrap();
        assert!(response.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let unknown = list_metrics(
            Path("widgets".to_string()),
            State(state()),
            Json(ListMetricsRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(unknown.into_response().status(), StatusCode::BAD_REQUEST);

        let backend = list_metrics(
            Path("clusters".to_string()),
            State(state()),
            Json(ListMetricsRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(backend.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_create_metrics_returns_no_content() {
        let status = create_metrics(
            Path("nodes".to_string()),
            State(state()),
            Json(CreateMetricsRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_delete_metrics_status_codes() {
        let request = DeleteMetricsRequest {
            object_metas: vec![ObjectMeta::named("c1")],
        };

        let status = delete_metrics(Path("pods".to_string()), State(state()), Json(request.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let failed = delete_metrics(Path("clusters".to_string()), State(state()), Json(request))
            .await
            .unwrap_err();
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
