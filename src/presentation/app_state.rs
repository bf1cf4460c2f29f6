// Application state for HTTP handlers
use crate::application::metrics_service::MetricsService;

#[derive(Clone)]
pub struct AppState {
    pub metrics_service: MetricsService,
}
