/// State sink: where published snapshots go
///
/// The collector only writes to a sink; it never reads back. All methods are
/// fire-and-forget.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};

use super::snapshot::{
    ContainerCounts, ContainerHealth, ContainerRecord, DockerStats, HasuraHealth,
    PostgresHealth, RedisHealth, SystemMetrics,
};

#[cfg_attr(test, mockall::automock)]
pub trait StateSink: Send + Sync {
    fn update_docker_stats(&self, stats: &DockerStats);
    fn update_container_counts(&self, counts: &ContainerCounts);
    fn update_container_health(&self, health: &ContainerHealth);
    fn update_system_metrics(&self, metrics: &SystemMetrics);
    fn update_containers(&self, containers: &[ContainerRecord]);
    fn update_postgres(&self, health: &PostgresHealth);
    fn update_hasura(&self, health: &HasuraHealth);
    fn update_redis(&self, health: &RedisHealth);

    fn set_connected(&self, connected: bool);
    /// Per-domain flag raised by genuine fetch failures, cleared on success
    fn set_degraded(&self, key: &str, degraded: bool);

    fn record_cache_hit(&self, key: &str);
    fn record_cache_miss(&self, key: &str);
    fn record_api_call(&self, key: &str);
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryCounters {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub api_calls: u64,
}

/// Serializable view of everything the store currently holds
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryState {
    pub connected: bool,
    pub docker: Option<DockerStats>,
    pub container_health: Option<ContainerHealth>,
    pub system: Option<SystemMetrics>,
    pub containers: Vec<ContainerRecord>,
    pub postgres: Option<PostgresHealth>,
    pub hasura: Option<HasuraHealth>,
    pub redis: Option<RedisHealth>,
    pub degraded: BTreeSet<String>,
    pub counters: TelemetryCounters,
}

/// In-memory sink holding the current copy of each snapshot
#[derive(Debug, Default)]
pub struct TelemetryStore {
    state: RwLock<TelemetryState>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    api_calls: AtomicU64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current state, counters included
    pub fn state(&self) -> TelemetryState {
        let mut state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        state.counters = TelemetryCounters {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
        };
        state
    }

    fn write<F: FnOnce(&mut TelemetryState)>(&self, apply: F) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut state);
    }
}

impl StateSink for TelemetryStore {
    fn update_docker_stats(&self, stats: &DockerStats) {
        self.write(|state| state.docker = Some(stats.clone()));
    }

    fn update_container_counts(&self, counts: &ContainerCounts) {
        self.write(|state| {
            if let Some(docker) = state.docker.as_mut() {
                docker.containers = *counts;
            }
        });
    }

    fn update_container_health(&self, health: &ContainerHealth) {
        self.write(|state| state.container_health = Some(health.clone()));
    }

    fn update_system_metrics(&self, metrics: &SystemMetrics) {
        self.write(|state| state.system = Some(metrics.clone()));
    }

    fn update_containers(&self, containers: &[ContainerRecord]) {
        self.write(|state| state.containers = containers.to_vec());
    }

    fn update_postgres(&self, health: &PostgresHealth) {
        self.write(|state| state.postgres = Some(health.clone()));
    }

    fn update_hasura(&self, health: &HasuraHealth) {
        self.write(|state| state.hasura = Some(health.clone()));
    }

    fn update_redis(&self, health: &RedisHealth) {
        self.write(|state| state.redis = Some(health.clone()));
    }

    fn set_connected(&self, connected: bool) {
        self.write(|state| state.connected = connected);
    }

    fn set_degraded(&self, key: &str, degraded: bool) {
        self.write(|state| {
            if degraded {
                if state.degraded.insert(key.to_string()) {
                    warn!(domain = key, "telemetry source degraded");
                }
            } else if state.degraded.remove(key) {
                info!(domain = key, "telemetry source recovered");
            }
        });
    }

    fn record_cache_hit(&self, _key: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self, _key: &str) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_api_call(&self, _key: &str) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }
}
