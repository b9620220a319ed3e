/// Canonical metric snapshots
///
/// One immutable, timestamped record per metric domain. Each type knows how
/// to build itself from the `data` value of its source, defaulting anything
/// the source left out instead of failing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::utils::{health_from_status, ContainerState};

// ============================================================================
// Defensive field access
// ============================================================================

fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

pub(crate) fn f64_at(value: &Value, path: &[&str]) -> f64 {
    at(value, path)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

pub(crate) fn u64_at(value: &Value, path: &[&str]) -> u64 {
    at(value, path)
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_f64().filter(|n| *n >= 0.0 && n.is_finite()).map(|n| n as u64))
        })
        .unwrap_or(0)
}

pub(crate) fn i64_at(value: &Value, path: &[&str]) -> i64 {
    at(value, path)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|n| n as i64)))
        .unwrap_or(0)
}

pub(crate) fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    at(value, path)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

pub(crate) fn bool_at(value: &Value, path: &[&str]) -> bool {
    at(value, path).and_then(Value::as_bool).unwrap_or(false)
}

fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    at(value, path)
        .and_then(Value::as_array)
        .map(|items| items.as_slice())
        .unwrap_or(&[])
}

// ============================================================================
// Shared building blocks
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Usage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

impl Usage {
    pub fn new(used: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self { used, total, percentage }
    }

    /// `{ used, total, percentage }`, deriving the percentage when absent
    pub fn from_value(value: &Value) -> Self {
        let used = u64_at(value, &["used"]);
        let total = u64_at(value, &["total"]);
        let percentage = f64_at(value, &["percentage"]);

        if percentage == 0.0 {
            Self::new(used, total)
        } else {
            Self { used, total, percentage }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkUsage {
    pub rx: u64,
    pub tx: u64,
    pub max: u64,
}

impl NetworkUsage {
    pub fn from_value(value: &Value) -> Self {
        let rx = u64_at(value, &["rx"]);
        let tx = u64_at(value, &["tx"]);
        let max = match u64_at(value, &["max"]) {
            0 => rx.max(tx),
            max => max,
        };
        Self { rx, tx, max }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerCounts {
    pub running: u64,
    pub stopped: u64,
    pub paused: u64,
    pub total: u64,
}

impl ContainerCounts {
    pub fn from_value(value: &Value) -> Self {
        let running = u64_at(value, &["running"]);
        let stopped = u64_at(value, &["stopped"]);
        let paused = u64_at(value, &["paused"]);
        let total = match u64_at(value, &["total"]) {
            0 => running.saturating_add(stopped).saturating_add(paused),
            total => total,
        };
        Self { running, stopped, paused, total }
    }

    /// Tally a list of lifecycle states
    pub fn from_states<I: IntoIterator<Item = ContainerState>>(states: I) -> Self {
        let mut counts = Self::default();
        for state in states {
            counts.total = counts.total.saturating_add(1);
            match state {
                ContainerState::Running => counts.running = counts.running.saturating_add(1),
                ContainerState::Paused => counts.paused = counts.paused.saturating_add(1),
                _ => counts.stopped = counts.stopped.saturating_add(1),
            }
        }
        counts
    }
}

// ============================================================================
// Runtime engine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerStats {
    /// Aggregate CPU usage as a fraction (0.0 - 1.0)
    pub cpu_fraction: f64,
    pub memory: Usage,
    pub storage: Usage,
    pub network: NetworkUsage,
    pub containers: ContainerCounts,
    pub captured_at: DateTime<Utc>,
}

impl DockerStats {
    pub fn from_data(data: &Value) -> Self {
        let empty = Value::Null;
        Self {
            cpu_fraction: f64_at(data, &["cpu", "usage"]),
            memory: Usage::from_value(at(data, &["memory"]).unwrap_or(&empty)),
            storage: Usage::from_value(at(data, &["storage"]).unwrap_or(&empty)),
            network: NetworkUsage::from_value(at(data, &["network"]).unwrap_or(&empty)),
            containers: ContainerCounts::from_value(at(data, &["containers"]).unwrap_or(&empty)),
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Host system
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub cpu_cores: u64,
    pub memory: Usage,
    pub disk: Usage,
    pub network: NetworkUsage,
    pub uptime_secs: u64,
    /// Runtime-engine counts reported alongside the host metrics, if any
    pub docker: Option<ContainerCounts>,
    pub captured_at: DateTime<Utc>,
}

impl SystemMetrics {
    pub fn from_data(data: &Value) -> Self {
        let empty = Value::Null;
        let system = at(data, &["system"]).unwrap_or(&empty);
        let docker = at(data, &["docker", "containers"])
            .filter(|v| v.is_object())
            .map(ContainerCounts::from_value);

        Self {
            cpu_percent: f64_at(system, &["cpu", "usage"]),
            cpu_cores: u64_at(system, &["cpu", "cores"]),
            memory: Usage::from_value(at(system, &["memory"]).unwrap_or(&empty)),
            disk: Usage::from_value(at(system, &["disk"]).unwrap_or(&empty)),
            network: NetworkUsage::from_value(at(system, &["network"]).unwrap_or(&empty)),
            uptime_secs: u64_at(system, &["uptime"]),
            docker,
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Container inventory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerCategory {
    Required,
    Optional,
    UserDefined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub status: String,
    pub health: Option<String>,
    pub cpu_percent: f64,
    pub memory: Usage,
    pub ports: Vec<String>,
    /// Unix seconds
    pub created: i64,
    pub uptime: String,
    pub category: ContainerCategory,
}

impl ContainerRecord {
    /// Map one list item. `uptime` and `category` start out as "N/A" and
    /// user-defined; the inventory fetcher derives the real values.
    pub fn from_item(item: &Value) -> Self {
        let status = str_at(item, &["status"]).unwrap_or_default();
        let state = str_at(item, &["state"])
            .map(|s| ContainerState::from(s.as_str()))
            .unwrap_or_else(|| ContainerState::from(status.as_str()));
        let health = str_at(item, &["health"])
            .filter(|h| !h.is_empty())
            .or_else(|| health_from_status(&status));

        let memory_usage = u64_at(item, &["stats", "memoryUsage"]);
        let memory_limit = u64_at(item, &["stats", "memoryLimit"]);
        let memory = match f64_at(item, &["stats", "memoryPercent"]) {
            p if p > 0.0 => Usage {
                used: memory_usage,
                total: memory_limit,
                percentage: p,
            },
            _ => Usage::new(memory_usage, memory_limit),
        };

        let ports = array_at(item, &["ports"])
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();

        Self {
            id: str_at(item, &["id"]).unwrap_or_default(),
            name: str_at(item, &["name"])
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            image: str_at(item, &["image"]).unwrap_or_else(|| "unknown".to_string()),
            state,
            status,
            health,
            cpu_percent: f64_at(item, &["stats", "cpuPercent"]),
            memory,
            ports,
            created: i64_at(item, &["created"]),
            uptime: "N/A".to_string(),
            category: ContainerCategory::UserDefined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInventory {
    pub containers: Vec<ContainerRecord>,
    pub captured_at: DateTime<Utc>,
}

/// Container list items of a `data` array (empty when `data` is not a list)
pub fn container_items(data: &Value) -> &[Value] {
    data.as_array().map(|items| items.as_slice()).unwrap_or(&[])
}

// ============================================================================
// Lightweight container health
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerHealth {
    pub counts: ContainerCounts,
    pub healthy: u64,
    pub unhealthy: u64,
    pub starting: u64,
    pub captured_at: DateTime<Utc>,
}

impl ContainerHealth {
    pub fn from_data(data: &Value) -> Self {
        let mut states = Vec::new();
        let (mut healthy, mut unhealthy, mut starting) = (0, 0, 0);

        for item in container_items(data) {
            let status = str_at(item, &["status"]).unwrap_or_default();
            let state = str_at(item, &["state"])
                .map(|s| ContainerState::from(s.as_str()))
                .unwrap_or_else(|| ContainerState::from(status.as_str()));
            states.push(state);

            let health = str_at(item, &["health"])
                .filter(|h| !h.is_empty())
                .or_else(|| health_from_status(&status));
            match health.as_deref() {
                Some("healthy") => healthy += 1,
                Some("unhealthy") => unhealthy += 1,
                Some("starting") => starting += 1,
                _ => {}
            }
        }

        Self {
            counts: ContainerCounts::from_states(states),
            healthy,
            unhealthy,
            starting,
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Managed services
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl From<&str> for ServiceStatus {
    fn from(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "healthy" | "up" | "running" | "ok" => ServiceStatus::Healthy,
            "degraded" | "warning" => ServiceStatus::Degraded,
            "down" | "unhealthy" | "stopped" | "error" => ServiceStatus::Down,
            _ => ServiceStatus::Unknown,
        }
    }
}

fn status_at(value: &Value) -> ServiceStatus {
    str_at(value, &["status"])
        .map(|s| ServiceStatus::from(s.as_str()))
        .unwrap_or(ServiceStatus::Unknown)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionPool {
    pub active: u64,
    pub idle: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresHealth {
    pub status: ServiceStatus,
    pub version: String,
    pub connections: ConnectionPool,
    pub database_size: u64,
    pub cache_hit_ratio: f64,
    pub transactions_per_second: f64,
    pub uptime_secs: u64,
    pub captured_at: DateTime<Utc>,
}

impl PostgresHealth {
    pub fn from_data(data: &Value) -> Self {
        Self {
            status: status_at(data),
            version: str_at(data, &["version"]).unwrap_or_default(),
            connections: ConnectionPool {
                active: u64_at(data, &["connections", "active"]),
                idle: u64_at(data, &["connections", "idle"]),
                max: u64_at(data, &["connections", "max"]),
            },
            database_size: u64_at(data, &["databaseSize"]),
            cache_hit_ratio: f64_at(data, &["cacheHitRatio"]),
            transactions_per_second: f64_at(data, &["transactionsPerSecond"]),
            uptime_secs: u64_at(data, &["uptime"]),
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HasuraHealth {
    pub status: ServiceStatus,
    pub version: String,
    pub metadata_consistent: bool,
    pub active_subscriptions: u64,
    pub requests_per_minute: f64,
    pub average_response_ms: f64,
    pub error_rate: f64,
    pub captured_at: DateTime<Utc>,
}

impl HasuraHealth {
    pub fn from_data(data: &Value) -> Self {
        Self {
            status: status_at(data),
            version: str_at(data, &["version"]).unwrap_or_default(),
            metadata_consistent: bool_at(data, &["metadataConsistent"]),
            active_subscriptions: u64_at(data, &["activeSubscriptions"]),
            requests_per_minute: f64_at(data, &["requestsPerMinute"]),
            average_response_ms: f64_at(data, &["averageResponseMs"]),
            error_rate: f64_at(data, &["errorRate"]),
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisHealth {
    pub status: ServiceStatus,
    pub version: String,
    pub connected_clients: u64,
    pub memory: Usage,
    pub hit_rate: f64,
    pub ops_per_second: f64,
    pub keys: u64,
    pub uptime_secs: u64,
    pub captured_at: DateTime<Utc>,
}

impl RedisHealth {
    pub fn from_data(data: &Value) -> Self {
        Self {
            status: status_at(data),
            version: str_at(data, &["version"]).unwrap_or_default(),
            connected_clients: u64_at(data, &["connectedClients"]),
            memory: Usage::new(u64_at(data, &["usedMemory"]), u64_at(data, &["maxMemory"])),
            hit_rate: f64_at(data, &["hitRate"]),
            ops_per_second: f64_at(data, &["opsPerSecond"]),
            keys: u64_at(data, &["keys"]),
            uptime_secs: u64_at(data, &["uptime"]),
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Tagged snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "domain", content = "snapshot", rename_all = "kebab-case")]
pub enum MetricSnapshot {
    DockerStats(DockerStats),
    ContainerHealth(ContainerHealth),
    SystemMetrics(SystemMetrics),
    Containers(ContainerInventory),
    PostgresHealth(PostgresHealth),
    HasuraHealth(HasuraHealth),
    RedisHealth(RedisHealth),
}

impl MetricSnapshot {
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            MetricSnapshot::DockerStats(s) => s.captured_at,
            MetricSnapshot::ContainerHealth(s) => s.captured_at,
            MetricSnapshot::SystemMetrics(s) => s.captured_at,
            MetricSnapshot::Containers(s) => s.captured_at,
            MetricSnapshot::PostgresHealth(s) => s.captured_at,
            MetricSnapshot::HasuraHealth(s) => s.captured_at,
            MetricSnapshot::RedisHealth(s) => s.captured_at,
        }
    }
}
