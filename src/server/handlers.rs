/// API Request Handlers
/// Serve the metric sources and expose the collector's read model

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::core::docker::{ContainerInfo, DockerManager, EngineStats};
use crate::core::services::placeholder_health;
use crate::core::system::{HostMetrics, HostProbe};
use crate::telemetry::snapshot::ContainerCounts;
use crate::telemetry::{CollectorSlot, TelemetryState, TelemetryStore};
use crate::utils::managed_service;

// ============================================================================
// Shared state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    /// The application's one collector slot, owned by the binary
    pub slot: &'static CollectorSlot,
    pub store: Arc<TelemetryStore>,
    /// `None` when the Docker daemon was unreachable at startup
    pub docker: Option<DockerManager>,
    pub host: Arc<HostProbe>,
}

impl AppState {
    fn docker(&self) -> Result<&DockerManager, ApiError> {
        self.docker
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("Docker daemon is not reachable"))
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

/// Failure answered with a non-2xx status and an error envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        warn!(error = %err, "source probe failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Docker sources
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ContainersQuery {
    #[serde(default)]
    stats: bool,
}

pub async fn get_docker_stats(State(state): State<AppState>) -> ApiResult<EngineStats> {
    let docker = state.docker()?;
    let host = Arc::clone(&state.host);
    let storage_total = tokio::task::spawn_blocking(move || host.disk_total())
        .await
        .unwrap_or(0);

    let stats = docker.engine_stats(storage_total).await.map_err(ApiError::internal)?;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn get_containers(
    State(state): State<AppState>,
    Query(params): Query<ContainersQuery>,
) -> ApiResult<Vec<ContainerInfo>> {
    let containers = state
        .docker()?
        .list_containers(params.stats)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(ApiResponse::ok(containers)))
}

// ============================================================================
// Host source
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DockerSibling {
    containers: ContainerCounts,
}

#[derive(Debug, Serialize)]
pub struct SystemPayload {
    system: HostMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    docker: Option<DockerSibling>,
}

pub async fn get_system_metrics(State(state): State<AppState>) -> ApiResult<SystemPayload> {
    let host = Arc::clone(&state.host);
    let system = tokio::task::spawn_blocking(move || host.sample())
        .await
        .map_err(|e| ApiError::internal(e.into()))?;

    // Counts are a bonus; host metrics are served even without Docker
    let docker = match &state.docker {
        Some(docker) => docker
            .container_counts()
            .await
            .ok()
            .map(|containers| DockerSibling { containers }),
        None => None,
    };

    Ok(Json(ApiResponse::ok(SystemPayload { system, docker })))
}

// ============================================================================
// Managed service sources
// ============================================================================

pub async fn get_service_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<serde_json::Value> {
    let service = managed_service(&name)
        .ok_or_else(|| ApiError::not_found(format!("Unknown service: {}", name)))?;

    let containers = match &state.docker {
        Some(docker) => docker.list_containers(false).await.map_err(ApiError::internal)?,
        None => Vec::new(),
    };

    Ok(Json(ApiResponse::ok(placeholder_health(service, &containers))))
}

// ============================================================================
// Telemetry read model and lifecycle
// ============================================================================

pub async fn get_telemetry(State(state): State<AppState>) -> ApiResult<TelemetryState> {
    Ok(Json(ApiResponse::ok(state.store.state())))
}

#[derive(Debug, Serialize)]
pub struct LifecycleStatus {
    running: bool,
    changed: bool,
}

pub async fn start_telemetry(State(state): State<AppState>) -> ApiResult<LifecycleStatus> {
    let collector = state
        .slot
        .get()
        .ok_or_else(|| ApiError::unavailable("Telemetry collector is not initialised"))?;

    let changed = collector.start();
    Ok(Json(ApiResponse::ok(LifecycleStatus {
        running: collector.is_running(),
        changed,
    })))
}

pub async fn stop_telemetry(State(state): State<AppState>) -> ApiResult<LifecycleStatus> {
    let collector = state
        .slot
        .get()
        .ok_or_else(|| ApiError::unavailable("Telemetry collector is not initialised"))?;

    let changed = collector.stop();
    Ok(Json(ApiResponse::ok(LifecycleStatus {
        running: collector.is_running(),
        changed,
    })))
}

// ============================================================================
// Monitoring Handlers
// ============================================================================

pub async fn health_check() -> ApiResult<String> {
    Ok(Json(ApiResponse::ok("healthy".to_string())))
}
