/// Stack service definitions and telemetry constants

use std::time::Duration;

/// Default root of the HTTP metric sources
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Default polling cadence per tier
pub const CRITICAL_INTERVAL: Duration = Duration::from_secs(1);
pub const HIGH_INTERVAL: Duration = Duration::from_secs(5);
pub const MEDIUM_INTERVAL: Duration = Duration::from_secs(30);

/// Cache TTL as a fraction of the tier interval (numerator / denominator)
pub const TTL_NUMERATOR: u32 = 4;
pub const TTL_DENOMINATOR: u32 = 5;

/// Source endpoints
pub const DOCKER_STATS_PATH: &str = "/api/docker/stats";
pub const CONTAINERS_PATH: &str = "/api/docker/containers";
pub const CONTAINERS_WITH_STATS_PATH: &str = "/api/docker/containers?stats=true";
pub const SYSTEM_METRICS_PATH: &str = "/api/system/metrics";
pub const POSTGRES_HEALTH_PATH: &str = "/api/services/postgres/health";
pub const HASURA_HEALTH_PATH: &str = "/api/services/hasura/health";
pub const REDIS_HEALTH_PATH: &str = "/api/services/redis/health";

/// Container name fragments of tooling that is nice to have but not needed
/// for the stack to work. Checked before the required list ("redis-insight"
/// would otherwise match "redis").
pub const OPTIONAL_SERVICE_PATTERNS: &[&str] = &[
    "pgadmin",
    "adminer",
    "grafana",
    "prometheus",
    "mailpit",
    "mailhog",
    "redisinsight",
    "redis-insight",
    "redis-commander",
];

/// Container name fragments of the core stack
pub const REQUIRED_SERVICE_PATTERNS: &[&str] = &[
    "postgres",
    "hasura",
    "graphql-engine",
    "redis",
    "minio",
    "traefik",
];

/// Managed services probed by the medium tier, with the container name
/// fragments used to locate them
#[derive(Debug, Clone, Copy)]
pub struct ManagedService {
    pub name: &'static str,
    pub container_patterns: &'static [&'static str],
}

pub const MANAGED_SERVICES: &[ManagedService] = &[
    ManagedService {
        name: "postgres",
        container_patterns: &["postgres"],
    },
    ManagedService {
        name: "hasura",
        container_patterns: &["hasura", "graphql-engine"],
    },
    ManagedService {
        name: "redis",
        container_patterns: &["redis"],
    },
];

pub fn managed_service(name: &str) -> Option<&'static ManagedService> {
    MANAGED_SERVICES.iter().find(|s| s.name == name)
}
