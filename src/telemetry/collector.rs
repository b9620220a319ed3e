/// Telemetry collector lifecycle
///
/// Owns the cache, the deduplicator, the scheduler and the one cancellation
/// scope of the current run. `start` and `stop` are idempotent and
/// synchronous; all asynchronous work runs on spawned tasks.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::cache::ExpiringCache;
use super::dedupe::RequestDeduplicator;
use super::fetchers::FetchContext;
use super::lock;
use super::scheduler::{default_tiers, ScheduleTier, TieredScheduler};
use super::sink::StateSink;
use super::snapshot::MetricSnapshot;
use super::transport::{HttpTransport, Transport};
use crate::utils::AppConfig;

#[derive(Debug, Clone)]
pub enum CollectorState {
    Stopped,
    Running { scope: CancellationToken },
}

impl CollectorState {
    pub fn is_running(&self) -> bool {
        matches!(self, CollectorState::Running { .. })
    }
}

struct Lifecycle {
    state: CollectorState,
    scheduler: TieredScheduler,
}

pub struct TelemetryCollector {
    lifecycle: Mutex<Lifecycle>,
    cache: Arc<ExpiringCache<MetricSnapshot>>,
    pending: Arc<RequestDeduplicator<MetricSnapshot>>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn StateSink>,
    commit: Arc<Mutex<()>>,
}

impl TelemetryCollector {
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn StateSink>, tiers: Vec<ScheduleTier>) -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: CollectorState::Stopped,
                scheduler: TieredScheduler::new(tiers),
            }),
            cache: Arc::new(ExpiringCache::new()),
            pending: Arc::new(RequestDeduplicator::new()),
            transport,
            sink,
            commit: Arc::default(),
        }
    }

    /// HTTP collector with the standard tiers, configured from `config`
    pub fn from_config(config: &AppConfig, sink: Arc<dyn StateSink>) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.base_url, config.request_timeout()?)?;
        let tiers = default_tiers(&config.tier_intervals()?);
        Ok(Self::new(Arc::new(transport), sink, tiers))
    }

    /// Begin collecting. Returns false when already running or when called
    /// outside a tokio runtime.
    pub fn start(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("telemetry collector needs a tokio runtime to start");
            return false;
        }

        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state.is_running() {
            return false;
        }

        // Whatever a previous run left in flight must not be joined
        self.pending.clear();

        let scope = CancellationToken::new();
        let ctx = self.context(scope.clone());
        lifecycle.scheduler.arm(&ctx);
        lifecycle.scheduler.trigger_all(&ctx);
        lifecycle.state = CollectorState::Running { scope };
        let tiers = lifecycle.scheduler.armed_count();
        drop(lifecycle);

        self.sink.set_connected(true);
        info!(tiers, "telemetry collector started");
        true
    }

    /// Stop collecting. Returns false when not running.
    pub fn stop(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        let scope = match std::mem::replace(&mut lifecycle.state, CollectorState::Stopped) {
            CollectorState::Running { scope } => scope,
            CollectorState::Stopped => return false,
        };

        // No fetch may write once this returns
        let commit = lock(&self.commit);
        scope.cancel();
        drop(commit);
        lifecycle.scheduler.disarm();
        drop(lifecycle);

        self.sink.set_connected(false);
        info!("telemetry collector stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.lifecycle).state.is_running()
    }

    pub fn state(&self) -> CollectorState {
        lock(&self.lifecycle).state.clone()
    }

    pub fn armed_tiers(&self) -> usize {
        lock(&self.lifecycle).scheduler.armed_count()
    }

    pub fn cache(&self) -> &ExpiringCache<MetricSnapshot> {
        &self.cache
    }

    pub fn pending(&self) -> &RequestDeduplicator<MetricSnapshot> {
        &self.pending
    }

    fn context(&self, scope: CancellationToken) -> FetchContext {
        FetchContext {
            cache: Arc::clone(&self.cache),
            pending: Arc::clone(&self.pending),
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            scope,
            commit: Arc::clone(&self.commit),
        }
    }
}

impl Drop for TelemetryCollector {
    fn drop(&mut self) {
        if let CollectorState::Running { scope } = &lock(&self.lifecycle).state {
            scope.cancel();
        }
    }
}
