pub mod accessor;
pub mod cache;
pub mod collector;
pub mod dedupe;
pub mod error;
pub mod fetchers;
pub mod scheduler;
pub mod sink;
pub mod snapshot;
pub mod transport;

pub use accessor::{CollectorSlot, EnvironmentEvent};
pub use cache::ExpiringCache;
pub use collector::TelemetryCollector;
pub use dedupe::RequestDeduplicator;
pub use error::FetchError;
pub use fetchers::{DomainFetcher, FetchContext};
pub use scheduler::{ScheduleTier, TierName, TieredScheduler};
pub use sink::{StateSink, TelemetryState, TelemetryStore};
pub use snapshot::MetricSnapshot;
pub use transport::{HttpTransport, Transport};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod testing {
    use futures::future::{BoxFuture, FutureExt};
    use serde_json::Value;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    use super::error::FetchError;
    use super::lock;
    use super::sink::StateSink;
    use super::snapshot::*;
    use super::transport::Transport;

    /// Scripted transport: canned answers per path, call counting, optional
    /// latency. Unknown paths answer 404.
    #[derive(Default)]
    pub struct FakeTransport {
        responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
        delays: Mutex<HashMap<String, Duration>>,
        default_delay: Mutex<Duration>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, path: &str, body: Value) {
            lock(&self.responses).insert(path.to_string(), Ok(body));
        }

        pub fn fail(&self, path: &str, error: FetchError) {
            lock(&self.responses).insert(path.to_string(), Err(error));
        }

        pub fn set_delay(&self, delay: Duration) {
            *lock(&self.default_delay) = delay;
        }

        pub fn delay_path(&self, path: &str, delay: Duration) {
            lock(&self.delays).insert(path.to_string(), delay);
        }

        pub fn calls(&self, path: &str) -> usize {
            lock(&self.calls).get(path).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            lock(&self.calls).values().sum()
        }
    }

    impl Transport for FakeTransport {
        fn get_json(&self, path: &str, scope: &CancellationToken) -> BoxFuture<'static, Result<Value, FetchError>> {
            *lock(&self.calls).entry(path.to_string()).or_insert(0) += 1;

            let answer = lock(&self.responses)
                .get(path)
                .cloned()
                .unwrap_or(Err(FetchError::Status(404)));
            let delay = lock(&self.delays)
                .get(path)
                .copied()
                .unwrap_or(*lock(&self.default_delay));
            let scope = scope.clone();

            async move {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => answer,
                }
            }
            .boxed()
        }
    }

    /// Sink that remembers which domains were published and what counts it saw
    #[derive(Default)]
    pub struct RecordingSink {
        pub updates: AtomicUsize,
        published: Mutex<Vec<&'static str>>,
        counts: Mutex<Option<ContainerCounts>>,
        degraded: Mutex<BTreeSet<String>>,
    }

    impl RecordingSink {
        fn record(&self, domain: &'static str) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            lock(&self.published).push(domain);
        }

        pub fn published(&self) -> Vec<&'static str> {
            lock(&self.published).clone()
        }

        pub fn published_count(&self, domain: &str) -> usize {
            lock(&self.published).iter().filter(|d| **d == domain).count()
        }

        pub fn last_counts(&self) -> Option<ContainerCounts> {
            *lock(&self.counts)
        }

        pub fn degraded(&self) -> BTreeSet<String> {
            lock(&self.degraded).clone()
        }
    }

    impl StateSink for RecordingSink {
        fn update_docker_stats(&self, _stats: &DockerStats) {
            self.record("docker-stats");
        }

        fn update_container_counts(&self, counts: &ContainerCounts) {
            *lock(&self.counts) = Some(*counts);
        }

        fn update_container_health(&self, _health: &ContainerHealth) {
            self.record("container-health");
        }

        fn update_system_metrics(&self, _metrics: &SystemMetrics) {
            self.record("system-metrics");
        }

        fn update_containers(&self, _containers: &[ContainerRecord]) {
            self.record("containers");
        }

        fn update_postgres(&self, _health: &PostgresHealth) {
            self.record("postgres-health");
        }

        fn update_hasura(&self, _health: &HasuraHealth) {
            self.record("hasura-health");
        }

        fn update_redis(&self, _health: &RedisHealth) {
            self.record("redis-health");
        }

        fn set_connected(&self, _connected: bool) {}

        fn set_degraded(&self, key: &str, degraded: bool) {
            let mut set = lock(&self.degraded);
            if degraded {
                set.insert(key.to_string());
            } else {
                set.remove(key);
            }
        }

        fn record_cache_hit(&self, _key: &str) {}
        fn record_cache_miss(&self, _key: &str) {}
        fn record_api_call(&self, _key: &str) {}
    }
}
