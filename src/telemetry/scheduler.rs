/// Tiered polling scheduler
///
/// Each tier owns one recurring timer. A tick spawns every fetcher of the
/// tier as its own task, so a slow fetch never delays the tier's next tick or
/// any other tier. Overlapping fetches of the same domain are arbitrated by
/// the deduplicator, not here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::fetchers::{
    ContainerHealthDomain, ContainersDomain, DockerStatsDomain, DomainFetcher, FetchContext,
    HasuraDomain, HttpFetcher, PostgresDomain, RedisDomain, SystemMetricsDomain,
};
use crate::utils::constants::{TTL_DENOMINATOR, TTL_NUMERATOR};
use crate::utils::TierIntervals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierName {
    Critical,
    High,
    Medium,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Critical => "critical",
            TierName::High => "high",
            TierName::Medium => "medium",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache lifetime for data polled every `interval`: slightly shorter than the
/// interval so every tick goes to the source
pub fn tier_ttl(interval: Duration) -> Duration {
    interval * TTL_NUMERATOR / TTL_DENOMINATOR
}

pub struct ScheduleTier {
    pub name: TierName,
    pub interval: Duration,
    pub fetchers: Vec<Arc<dyn DomainFetcher>>,
}

impl ScheduleTier {
    pub fn new(name: TierName, interval: Duration) -> Self {
        Self {
            name,
            // tokio intervals reject a zero period
            interval: interval.max(Duration::from_millis(1)),
            fetchers: Vec::new(),
        }
    }

    pub fn with_fetcher<F: DomainFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetchers.push(Arc::new(fetcher));
        self
    }

    pub fn ttl(&self) -> Duration {
        tier_ttl(self.interval)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.fetchers.iter().map(|f| f.key()).collect()
    }
}

/// The standard stack tiers
pub fn default_tiers(intervals: &TierIntervals) -> Vec<ScheduleTier> {
    let critical = ScheduleTier::new(TierName::Critical, intervals.critical);
    let ttl = critical.ttl();
    let critical = critical
        .with_fetcher(HttpFetcher::<DockerStatsDomain>::new(ttl))
        .with_fetcher(HttpFetcher::<ContainerHealthDomain>::new(ttl));

    let high = ScheduleTier::new(TierName::High, intervals.high);
    let ttl = high.ttl();
    let high = high
        .with_fetcher(HttpFetcher::<SystemMetricsDomain>::new(ttl))
        .with_fetcher(HttpFetcher::<ContainersDomain>::new(ttl));

    let medium = ScheduleTier::new(TierName::Medium, intervals.medium);
    let ttl = medium.ttl();
    let medium = medium
        .with_fetcher(HttpFetcher::<PostgresDomain>::new(ttl))
        .with_fetcher(HttpFetcher::<HasuraDomain>::new(ttl))
        .with_fetcher(HttpFetcher::<RedisDomain>::new(ttl));

    vec![critical, high, medium]
}

pub struct TieredScheduler {
    tiers: Vec<Arc<ScheduleTier>>,
    handles: HashMap<TierName, JoinHandle<()>>,
}

impl TieredScheduler {
    pub fn new(tiers: Vec<ScheduleTier>) -> Self {
        Self {
            tiers: tiers.into_iter().map(Arc::new).collect(),
            handles: HashMap::new(),
        }
    }

    /// Number of tier timers currently armed
    pub fn armed_count(&self) -> usize {
        self.handles.len()
    }

    /// Fire every fetcher of every tier once, now
    pub fn trigger_all(&self, ctx: &FetchContext) {
        for tier in &self.tiers {
            spawn_fetchers(tier, ctx);
        }
    }

    /// Start one recurring timer per tier. The first tick lands one interval
    /// from now. Any previously armed timers are dropped first.
    pub fn arm(&mut self, ctx: &FetchContext) {
        self.disarm();

        for tier in &self.tiers {
            let handle = tokio::spawn(run_tier(Arc::clone(tier), ctx.clone()));
            self.handles.insert(tier.name, handle);
        }
    }

    /// Abort every tier timer and forget its handle
    pub fn disarm(&mut self) {
        for (name, handle) in self.handles.drain() {
            debug!(tier = %name, "tier timer cleared");
            handle.abort();
        }
    }
}

impl Drop for TieredScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn spawn_fetchers(tier: &ScheduleTier, ctx: &FetchContext) {
    for fetcher in &tier.fetchers {
        tokio::spawn(fetcher.fetch(ctx.clone()));
    }
}

async fn run_tier(tier: Arc<ScheduleTier>, ctx: FetchContext) {
    let mut ticker = interval_at(Instant::now() + tier.interval, tier.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(tier = %tier.name, interval = ?tier.interval, "tier timer armed");

    loop {
        tokio::select! {
            _ = ctx.scope.cancelled() => break,
            _ = ticker.tick() => spawn_fetchers(&tier, &ctx),
        }
    }
}
