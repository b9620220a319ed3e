/// API Routes definition

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::websocket;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Metric sources polled by the collector
    let source_routes = Router::new()
        .route("/api/docker/stats", get(handlers::get_docker_stats))
        .route("/api/docker/containers", get(handlers::get_containers))
        .route("/api/system/metrics", get(handlers::get_system_metrics))
        .route("/api/services/:name/health", get(handlers::get_service_health));

    let telemetry_routes = Router::new()
        .route("/api/telemetry", get(handlers::get_telemetry))
        .route("/api/telemetry/start", post(handlers::start_telemetry))
        .route("/api/telemetry/stop", post(handlers::stop_telemetry))
        .route("/ws/telemetry", get(websocket::ws_telemetry_handler));

    let mut app = Router::new()
        .merge(source_routes)
        .merge(telemetry_routes)
        .route("/api/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
