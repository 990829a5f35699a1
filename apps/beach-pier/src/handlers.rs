use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{
    launcher::RendererLauncher,
    relay::{Relay, RelayStats},
    websocket::websocket_handler,
};

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub launcher: Option<Arc<RendererLauncher>>,
    pub metrics: PrometheusHandle,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    relay: RelayStats,
    renderer_busy: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/debug/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// GET /debug/stats - Snapshot of sessions and pairs.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        relay: state.relay.stats(),
        renderer_busy: state
            .launcher
            .as_ref()
            .is_some_and(|launcher| launcher.is_busy()),
    })
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
