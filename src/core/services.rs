/// Managed service health probes
///
/// Placeholder probes: status comes from the service's container, every
/// counter is zero. A real probe only has to produce the same shape.

use serde_json::{json, Value};

use super::docker::ContainerInfo;
use crate::telemetry::fetchers::categorize;
use crate::telemetry::snapshot::ContainerCategory;
use crate::utils::{ContainerState, ManagedService};

/// The container backing `service`, skipping optional tooling whose name
/// happens to contain the service name (redis-insight, pgadmin)
pub fn find_container<'a>(service: &ManagedService, containers: &'a [ContainerInfo]) -> Option<&'a ContainerInfo> {
    containers.iter().find(|c| {
        let name = c.name.to_lowercase();
        service.container_patterns.iter().any(|p| name.contains(p))
            && categorize(&c.name) != ContainerCategory::Optional
    })
}

/// Status keyword for a container, as understood by the telemetry snapshots
pub fn container_status(container: Option<&ContainerInfo>) -> &'static str {
    let Some(container) = container else {
        return "down";
    };

    match (container.state, container.health.as_deref()) {
        (ContainerState::Running, Some("unhealthy")) => "unhealthy",
        (ContainerState::Running, Some("starting")) => "degraded",
        (ContainerState::Running, _) => "healthy",
        (ContainerState::Paused | ContainerState::Restarting, _) => "degraded",
        (ContainerState::Unknown, _) => "unknown",
        _ => "down",
    }
}

/// Image tag, e.g. "16-alpine" for "postgres:16-alpine"
fn image_version(container: Option<&ContainerInfo>) -> String {
    container
        .and_then(|c| c.image.rsplit_once(':'))
        .map(|(_, tag)| tag.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `data` payload of `/api/services/{name}/health`
pub fn placeholder_health(service: &ManagedService, containers: &[ContainerInfo]) -> Value {
    let container = find_container(service, containers);
    let status = container_status(container);
    let version = image_version(container);

    match service.name {
        "postgres" => json!({
            "status": status,
            "version": version,
            "connections": { "active": 0, "idle": 0, "max": 0 },
            "databaseSize": 0,
            "cacheHitRatio": 0.0,
            "transactionsPerSecond": 0.0,
            "uptime": 0,
        }),
        "hasura" => json!({
            "status": status,
            "version": version,
            "metadataConsistent": status == "healthy",
            "activeSubscriptions": 0,
            "requestsPerMinute": 0.0,
            "averageResponseMs": 0.0,
            "errorRate": 0.0,
        }),
        "redis" => json!({
            "status": status,
            "version": version,
            "connectedClients": 0,
            "usedMemory": 0,
            "maxMemory": 0,
            "hitRate": 0.0,
            "opsPerSecond": 0.0,
            "keys": 0,
            "uptime": 0,
        }),
        _ => json!({ "status": status, "version": version }),
    }
}
