// Main entry point - Dependency injection and server setup
mod api;
mod application;
mod domain;
mod error;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::metrics_repository::MetricsRepository;
use crate::application::metrics_service::MetricsService;
use crate::infrastructure::config::{load_settings, MetricsSource};
use crate::infrastructure::influxdb::client::InfluxClient;
use crate::infrastructure::influxdb::repository::InfluxMetricsRepository;
use crate::infrastructure::prometheus::client::PrometheusClient;
use crate::infrastructure::prometheus::repository::PrometheusRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{create_metrics, delete_metrics, health_check, list_metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings().context("Failed to load configuration")?;

    // Writes always go to InfluxDB; reads follow the configured source
    let influx = Arc::new(
        InfluxMetricsRepository::new(
            InfluxClient::new(&settings.influxdb)?,
            settings.influxdb.database.clone(),
        )
        .with_gpu_database(settings.influxdb.gpu_database.clone()),
    );
    if let Err(e) = influx.ensure_database().await {
        tracing::warn!("influxdb not ready: {}", e);
    }

    let source: Arc<dyn MetricsRepository> = match settings.metrics_source {
        MetricsSource::Prometheus => {
            let prometheus = PrometheusRepository::new(PrometheusClient::new(&settings.prometheus)?);
            if let Err(e) = prometheus.check_ready().await {
                tracing::warn!("prometheus not ready: {}", e);
            }
            Arc::new(prometheus)
        }
        MetricsSource::Influxdb => influx.clone(),
    };

    let state = Arc::new(AppState {
        metrics_service: MetricsService::new(source, influx),
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/v1alpha1/metrics/:kind", post(list_metrics))
        .route("/v1alpha1/metrics/:kind/create", post(create_metrics))
        .route("/v1alpha1/metrics/:kind/delete", post(delete_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = settings
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address {}", settings.server.bind_address))?;
    tracing::info!(
        "Starting datahub-telemetry on {} reading from {:?}",
        addr,
        settings.metrics_source
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
