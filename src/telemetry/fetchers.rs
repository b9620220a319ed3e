/// Domain fetchers
///
/// Every domain runs the same template: serve from cache when fresh,
/// otherwise join or start the single pending request for the domain, map the
/// payload into its snapshot, cache it, and publish it to the sink. No error
/// ever leaves a fetcher; the next tick is the retry.

use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::cache::ExpiringCache;
use super::dedupe::RequestDeduplicator;
use super::error::FetchError;
use super::lock;
use super::sink::StateSink;
use super::snapshot::{
    container_items, ContainerCategory, ContainerHealth, ContainerInventory, ContainerRecord,
    DockerStats, HasuraHealth, MetricSnapshot, PostgresHealth, RedisHealth, SystemMetrics,
};
use super::transport::{unwrap_envelope, Transport};
use crate::utils::constants::{
    CONTAINERS_PATH, CONTAINERS_WITH_STATS_PATH, DOCKER_STATS_PATH, HASURA_HEALTH_PATH,
    OPTIONAL_SERVICE_PATTERNS, POSTGRES_HEALTH_PATH, REDIS_HEALTH_PATH,
    REQUIRED_SERVICE_PATTERNS, SYSTEM_METRICS_PATH,
};

/// Everything a fetch needs, bound to one cancellation scope
#[derive(Clone)]
pub struct FetchContext {
    pub cache: Arc<ExpiringCache<MetricSnapshot>>,
    pub pending: Arc<RequestDeduplicator<MetricSnapshot>>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn StateSink>,
    pub scope: CancellationToken,
    /// Held while a settled fetch writes its result, and by `stop` while it
    /// cancels the scope
    pub commit: Arc<Mutex<()>>,
}

/// A schedulable unit of telemetry collection
pub trait DomainFetcher: Send + Sync {
    /// Cache and deduplication key
    fn key(&self) -> &'static str;

    /// Run one collection attempt. Never fails; errors are absorbed.
    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, ()>;
}

/// Static description of one metric domain served over HTTP
pub trait Domain: Send + Sync + 'static {
    const KEY: &'static str;
    const PATH: &'static str;

    type Snapshot: Send + 'static;

    fn parse(data: &Value) -> Self::Snapshot;
    fn publish(sink: &dyn StateSink, snapshot: &Self::Snapshot);
    fn wrap(snapshot: Self::Snapshot) -> MetricSnapshot;
}

/// The HTTP-backed fetcher template for a `Domain`
pub struct HttpFetcher<D> {
    ttl: Duration,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain> HttpFetcher<D> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            _domain: PhantomData,
        }
    }
}

impl<D: Domain> DomainFetcher for HttpFetcher<D> {
    fn key(&self) -> &'static str {
        D::KEY
    }

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, ()> {
        fetch_domain::<D>(ctx, self.ttl).boxed()
    }
}

async fn fetch_domain<D: Domain>(ctx: FetchContext, ttl: Duration) {
    if ctx.cache.contains_fresh(D::KEY) {
        ctx.sink.record_cache_hit(D::KEY);
        debug!(domain = D::KEY, "cache hit");
        return;
    }

    ctx.sink.record_cache_miss(D::KEY);

    let op_ctx = ctx.clone();
    let outcome = ctx
        .pending
        .dedupe(D::KEY, move || perform_fetch::<D>(op_ctx, ttl))
        .await;

    match outcome {
        Ok(snapshot) => {
            debug!(domain = D::KEY, captured_at = %snapshot.captured_at(), "snapshot published");
        }
        Err(err) if err.is_cancellation() => {
            debug!(domain = D::KEY, "fetch cancelled");
        }
        Err(err) => {
            debug!(domain = D::KEY, error = %err, "fetch failed, keeping previous snapshot");
        }
    }
}

async fn perform_fetch<D: Domain>(ctx: FetchContext, ttl: Duration) -> Result<MetricSnapshot, FetchError> {
    ctx.sink.record_api_call(D::KEY);

    let result: Result<D::Snapshot, FetchError> = async {
        let body = ctx.transport.get_json(D::PATH, &ctx.scope).await?;
        let data = unwrap_envelope(body)?;
        Ok(D::parse(&data))
    }
    .await;

    // A stop that lands after the response arrived still wins
    let _commit = lock(&ctx.commit);
    if ctx.scope.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    match result {
        Ok(snapshot) => {
            D::publish(ctx.sink.as_ref(), &snapshot);
            ctx.sink.set_degraded(D::KEY, false);

            let snapshot = D::wrap(snapshot);
            ctx.cache.set(D::KEY, snapshot.clone(), ttl);
            Ok(snapshot)
        }
        Err(err) => {
            if !err.is_cancellation() {
                ctx.sink.set_degraded(D::KEY, true);
            }
            Err(err)
        }
    }
}

// ============================================================================
// Derived container fields
// ============================================================================

/// Classify a container by name: optional tooling first, then the core stack
pub fn categorize(name: &str) -> ContainerCategory {
    let name = name.to_lowercase();

    if OPTIONAL_SERVICE_PATTERNS.iter().any(|p| name.contains(p)) {
        ContainerCategory::Optional
    } else if REQUIRED_SERVICE_PATTERNS.iter().any(|p| name.contains(p)) {
        ContainerCategory::Required
    } else {
        ContainerCategory::UserDefined
    }
}

/// "Up 2 hours (healthy)" -> "2 hours"; anything not running -> "N/A"
pub fn parse_uptime(status: &str) -> String {
    static UPTIME_RE: OnceLock<Regex> = OnceLock::new();
    let re = UPTIME_RE.get_or_init(|| {
        Regex::new(r"^Up\s+(.+?)(?:\s+\([^)]*\))?\s*$").expect("valid uptime pattern")
    });

    re.captures(status.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

// ============================================================================
// Domains
// ============================================================================

pub struct DockerStatsDomain;

impl Domain for DockerStatsDomain {
    const KEY: &'static str = "docker-stats";
    const PATH: &'static str = DOCKER_STATS_PATH;
    type Snapshot = DockerStats;

    fn parse(data: &Value) -> DockerStats {
        DockerStats::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &DockerStats) {
        sink.update_docker_stats(snapshot);
    }

    fn wrap(snapshot: DockerStats) -> MetricSnapshot {
        MetricSnapshot::DockerStats(snapshot)
    }
}

/// Lightweight probe: container list without stats, reduced to counts
pub struct ContainerHealthDomain;

impl Domain for ContainerHealthDomain {
    const KEY: &'static str = "container-health";
    const PATH: &'static str = CONTAINERS_PATH;
    type Snapshot = ContainerHealth;

    fn parse(data: &Value) -> ContainerHealth {
        ContainerHealth::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &ContainerHealth) {
        sink.update_container_health(snapshot);
        // Keep the runtime-engine view consistent with what we just counted
        sink.update_container_counts(&snapshot.counts);
    }

    fn wrap(snapshot: ContainerHealth) -> MetricSnapshot {
        MetricSnapshot::ContainerHealth(snapshot)
    }
}

pub struct SystemMetricsDomain;

impl Domain for SystemMetricsDomain {
    const KEY: &'static str = "system-metrics";
    const PATH: &'static str = SYSTEM_METRICS_PATH;
    type Snapshot = SystemMetrics;

    fn parse(data: &Value) -> SystemMetrics {
        SystemMetrics::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &SystemMetrics) {
        sink.update_system_metrics(snapshot);
        if let Some(counts) = &snapshot.docker {
            sink.update_container_counts(counts);
        }
    }

    fn wrap(snapshot: SystemMetrics) -> MetricSnapshot {
        MetricSnapshot::SystemMetrics(snapshot)
    }
}

/// Full inventory with per-container stats
pub struct ContainersDomain;

impl Domain for ContainersDomain {
    const KEY: &'static str = "containers";
    const PATH: &'static str = CONTAINERS_WITH_STATS_PATH;
    type Snapshot = ContainerInventory;

    fn parse(data: &Value) -> ContainerInventory {
        let containers = container_items(data)
            .iter()
            .map(|item| {
                let mut record = ContainerRecord::from_item(item);
                record.uptime = parse_uptime(&record.status);
                record.category = categorize(&record.name);
                record
            })
            .collect();

        ContainerInventory {
            containers,
            captured_at: chrono::Utc::now(),
        }
    }

    fn publish(sink: &dyn StateSink, snapshot: &ContainerInventory) {
        sink.update_containers(&snapshot.containers);
    }

    fn wrap(snapshot: ContainerInventory) -> MetricSnapshot {
        MetricSnapshot::Containers(snapshot)
    }
}

pub struct PostgresDomain;

impl Domain for PostgresDomain {
    const KEY: &'static str = "postgres-health";
    const PATH: &'static str = POSTGRES_HEALTH_PATH;
    type Snapshot = PostgresHealth;

    fn parse(data: &Value) -> PostgresHealth {
        PostgresHealth::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &PostgresHealth) {
        sink.update_postgres(snapshot);
    }

    fn wrap(snapshot: PostgresHealth) -> MetricSnapshot {
        MetricSnapshot::PostgresHealth(snapshot)
    }
}

pub struct HasuraDomain;

impl Domain for HasuraDomain {
    const KEY: &'static str = "hasura-health";
    const PATH: &'static str = HASURA_HEALTH_PATH;
    type Snapshot = HasuraHealth;

    fn parse(data: &Value) -> HasuraHealth {
        HasuraHealth::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &HasuraHealth) {
        sink.update_hasura(snapshot);
    }

    fn wrap(snapshot: HasuraHealth) -> MetricSnapshot {
        MetricSnapshot::HasuraHealth(snapshot)
    }
}

pub struct RedisDomain;

impl Domain for RedisDomain {
    const KEY: &'static str = "redis-health";
    const PATH: &'static str = REDIS_HEALTH_PATH;
    type Snapshot = RedisHealth;

    fn parse(data: &Value) -> RedisHealth {
        RedisHealth::from_data(data)
    }

    fn publish(sink: &dyn StateSink, snapshot: &RedisHealth) {
        sink.update_redis(snapshot);
    }

    fn wrap(snapshot: RedisHealth) -> MetricSnapshot {
        MetricSnapshot::RedisHealth(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sink::MockStateSink;
    use crate::telemetry::testing::{FakeTransport, RecordingSink};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn context(transport: Arc<FakeTransport>, sink: Arc<dyn StateSink>) -> FetchContext {
        FetchContext {
            cache: Arc::new(ExpiringCache::new()),
            pending: Arc::new(RequestDeduplicator::new()),
            transport,
            sink,
            scope: CancellationToken::new(),
            commit: Arc::default(),
        }
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("stack-postgres-1"), ContainerCategory::Required);
        assert_eq!(categorize("hasura"), ContainerCategory::Required);
        assert_eq!(categorize("MinIO"), ContainerCategory::Required);
        assert_eq!(categorize("redis-insight"), ContainerCategory::Optional);
        assert_eq!(categorize("pgadmin4"), ContainerCategory::Optional);
        assert_eq!(categorize("my-api"), ContainerCategory::UserDefined);
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("Up 2 hours (healthy)"), "2 hours");
        assert_eq!(parse_uptime("Up About a minute"), "About a minute");
        assert_eq!(parse_uptime("Up 3 days (health: starting)"), "3 days");
        assert_eq!(parse_uptime("Exited (0) 5 minutes ago"), "N/A");
        assert_eq!(parse_uptime(""), "N/A");
    }

    #[test]
    fn test_inventory_derives_secondary_fields() {
        let inventory = ContainersDomain::parse(&json!([
            {
                "id": "abc", "name": "postgres", "image": "postgres:16",
                "state": "running", "status": "Up 2 hours (healthy)",
                "stats": { "cpuPercent": 1.5, "memoryUsage": 100, "memoryLimit": 400 }
            },
            { "id": "def", "name": "grafana", "state": "exited", "status": "Exited (0) 1 hour ago" }
        ]));

        let pg = &inventory.containers[0];
        assert_eq!(pg.uptime, "2 hours");
        assert_eq!(pg.category, ContainerCategory::Required);
        assert_eq!(pg.health.as_deref(), Some("healthy"));
        assert_eq!(pg.memory.percentage, 25.0);

        let grafana = &inventory.containers[1];
        assert_eq!(grafana.uptime, "N/A");
        assert_eq!(grafana.category, ContainerCategory::Optional);
        assert_eq!(grafana.cpu_percent, 0.0);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(DOCKER_STATS_PATH, json!({ "success": true, "data": { "cpu": { "usage": 0.5 } } }));

        let mut sink = MockStateSink::new();
        sink.expect_record_cache_miss().times(1).return_const(());
        sink.expect_record_api_call().times(1).return_const(());
        sink.expect_update_docker_stats()
            .withf(|stats| stats.cpu_fraction == 0.5)
            .times(1)
            .return_const(());
        sink.expect_set_degraded()
            .withf(|key, degraded| key.to_string() == "docker-stats" && !*degraded)
            .times(1)
            .return_const(());
        sink.expect_record_cache_hit().times(1).return_const(());

        let ctx = context(Arc::clone(&transport), Arc::new(sink));
        let fetcher = HttpFetcher::<DockerStatsDomain>::new(Duration::from_secs(1));

        fetcher.fetch(ctx.clone()).await;
        fetcher.fetch(ctx.clone()).await;

        assert_eq!(transport.calls(DOCKER_STATS_PATH), 1);
        assert!(ctx.cache.get("docker-stats").is_some());
    }

    #[tokio::test]
    async fn test_http_500_keeps_previous_cache_entry() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail(REDIS_HEALTH_PATH, FetchError::Status(500));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        let previous = MetricSnapshot::RedisHealth(RedisHealth::from_data(&json!({ "keys": 9 })));
        // Already stale, so the fetcher goes to the network
        ctx.cache.set("redis-health", previous, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(2)).await;

        HttpFetcher::<RedisDomain>::new(Duration::from_secs(25)).fetch(ctx.clone()).await;

        assert_eq!(transport.calls(REDIS_HEALTH_PATH), 1);
        assert_eq!(sink.updates.load(Ordering::SeqCst), 0);
        assert!(sink.degraded().contains("redis-health"));
        // Stale entry was evicted on read, nothing new was written
        assert!(ctx.cache.get("redis-health").is_none());
    }

    #[tokio::test]
    async fn test_http_500_leaves_fresh_entry_untouched() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail(POSTGRES_HEALTH_PATH, FetchError::Status(500));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        let previous = MetricSnapshot::PostgresHealth(PostgresHealth::from_data(&json!({ "status": "healthy" })));
        ctx.cache.set("postgres-health", previous.clone(), Duration::from_secs(60));

        // Force the network path directly to exercise the failure branch
        let outcome = perform_fetch::<PostgresDomain>(ctx.clone(), Duration::from_secs(25)).await;
        assert_eq!(outcome, Err(FetchError::Status(500)));
        assert_eq!(ctx.cache.get("postgres-health"), Some(previous));
    }

    #[tokio::test]
    async fn test_rejected_envelope_is_a_failure() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(SYSTEM_METRICS_PATH, json!({ "success": false, "error": "sysinfo unavailable" }));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        HttpFetcher::<SystemMetricsDomain>::new(Duration::from_secs(4)).fetch(ctx.clone()).await;

        assert_eq!(sink.updates.load(Ordering::SeqCst), 0);
        assert!(ctx.cache.is_empty());
        assert!(sink.degraded().contains("system-metrics"));
    }

    #[tokio::test]
    async fn test_system_metrics_refreshes_container_counts() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            SYSTEM_METRICS_PATH,
            json!({
                "success": true,
                "data": {
                    "system": { "cpu": { "usage": 12.0 } },
                    "docker": { "containers": { "running": 5, "total": 6 } }
                }
            }),
        );
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        HttpFetcher::<SystemMetricsDomain>::new(Duration::from_secs(4)).fetch(ctx).await;

        let counts = sink.last_counts().expect("counts refreshed");
        assert_eq!(counts.running, 5);
        assert_eq!(counts.total, 6);
    }

    #[tokio::test]
    async fn test_container_health_refreshes_container_counts() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            CONTAINERS_PATH,
            json!({
                "success": true,
                "data": [
                    { "name": "postgres", "state": "running", "status": "Up 1 hour (healthy)" },
                    { "name": "redis", "state": "exited" }
                ]
            }),
        );
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        HttpFetcher::<ContainerHealthDomain>::new(Duration::from_millis(800)).fetch(ctx).await;

        let counts = sink.last_counts().expect("counts refreshed");
        assert_eq!((counts.running, counts.stopped, counts.total), (1, 1, 2));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_issue_one_request() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(CONTAINERS_WITH_STATS_PATH, json!({ "success": true, "data": [] }));
        transport.set_delay(Duration::from_millis(20));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());
        let fetcher = HttpFetcher::<ContainersDomain>::new(Duration::from_secs(4));

        futures::future::join_all((0..5).map(|_| fetcher.fetch(ctx.clone()))).await;

        assert_eq!(transport.calls(CONTAINERS_WITH_STATS_PATH), 1);
        assert_eq!(sink.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_silent() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(HASURA_HEALTH_PATH, json!({ "success": true, "data": { "status": "healthy" } }));
        transport.set_delay(Duration::from_secs(60));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        let task = tokio::spawn(
            HttpFetcher::<HasuraDomain>::new(Duration::from_secs(25)).fetch(ctx.clone()),
        );
        tokio::task::yield_now().await;
        ctx.scope.cancel();

        // Completes without panicking and without writing anything
        task.await.unwrap();
        assert_eq!(sink.updates.load(Ordering::SeqCst), 0);
        assert!(sink.degraded().is_empty());
        assert!(ctx.cache.is_empty());
        assert!(!ctx.pending.is_pending("hasura-health"));
    }

    #[tokio::test]
    async fn test_oversized_counts_do_not_stop_the_domain() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            DOCKER_STATS_PATH,
            json!({ "success": true, "data": { "containers": { "running": u64::MAX, "stopped": 1 } } }),
        );
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());
        let fetcher = HttpFetcher::<DockerStatsDomain>::new(Duration::from_millis(1));

        fetcher.fetch(ctx.clone()).await;
        assert_eq!(sink.published_count("docker-stats"), 1);
        assert!(!ctx.pending.is_pending("docker-stats"));

        transport.respond(DOCKER_STATS_PATH, json!({ "success": true, "data": { "cpu": { "usage": 0.2 } } }));
        tokio::time::sleep(Duration::from_millis(5)).await;
        fetcher.fetch(ctx.clone()).await;

        assert_eq!(transport.calls(DOCKER_STATS_PATH), 2);
        assert_eq!(sink.published_count("docker-stats"), 2);
        assert!(sink.degraded().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_commit_held_discards_result() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(POSTGRES_HEALTH_PATH, json!({ "success": true, "data": { "status": "healthy" } }));
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Arc::clone(&transport), sink.clone());

        // Stand in for a stop that is mid-way through cancelling
        let commit = ctx.commit.lock().unwrap();
        let task = tokio::spawn(
            HttpFetcher::<PostgresDomain>::new(Duration::from_secs(25)).fetch(ctx.clone()),
        );
        while transport.calls(POSTGRES_HEALTH_PATH) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.updates.load(Ordering::SeqCst), 0);

        ctx.scope.cancel();
        drop(commit);

        task.await.unwrap();
        assert_eq!(sink.updates.load(Ordering::SeqCst), 0);
        assert!(sink.degraded().is_empty());
        assert!(ctx.cache.is_empty());
    }
}
