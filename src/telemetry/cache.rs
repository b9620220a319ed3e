/// Expiring per-key cache
///
/// Holds the most recent successful result for each logical key. Expiry is
/// lazy: a stale entry is only dropped when a read finds it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::lock;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub captured_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now - captured_at <= ttl`
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) <= self.ttl
    }
}

#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `data` under `key`, replacing any previous entry
    pub fn set(&self, key: &str, data: V, ttl: Duration) {
        let entry = CacheEntry {
            data,
            captured_at: Instant::now(),
            ttl,
        };
        lock(&self.entries).insert(key.to_string(), entry);
    }

    /// Fresh data for `key`, evicting the entry if it has gone stale
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Whether `key` holds fresh data, with the same eviction as `get` but
    /// without cloning the value
    pub fn contains_fresh(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Capture time of the entry for `key`, fresh or not, without evicting it
    pub fn captured_at(&self, key: &str) -> Option<Instant> {
        lock(&self.entries).get(key).map(|entry| entry.captured_at)
    }

    /// Drop everything. Only used on a full reset.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl_returns_value() {
        let cache = ExpiringCache::new();
        cache.set("docker-stats", 42u32, Duration::from_secs(1));

        advance(Duration::from_millis(999)).await;
        assert_eq!(cache.get("docker-stats"), Some(42));

        // Boundary is inclusive
        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("docker-stats"), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = ExpiringCache::new();
        cache.set("containers", "snapshot".to_string(), Duration::from_secs(4));
        assert_eq!(cache.len(), 1);

        advance(Duration::from_millis(4001)).await;

        // Still physically present until something reads it
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("containers"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_restarts_clock() {
        let cache = ExpiringCache::new();
        cache.set("redis-health", 1u8, Duration::from_secs(2));

        advance(Duration::from_millis(1500)).await;
        cache.set("redis-health", 2u8, Duration::from_secs(2));

        advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("redis-health"), Some(2));
    }

    #[tokio::test]
    async fn test_missing_key_and_clear() {
        let cache: ExpiringCache<u8> = ExpiringCache::new();
        assert_eq!(cache.get("nope"), None);

        cache.set("a", 1, Duration::from_secs(30));
        cache.set("b", 2, Duration::from_secs(30));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contains_fresh_evicts_like_get() {
        let cache = ExpiringCache::new();
        cache.set("containers", vec![1u8; 64], Duration::from_secs(4));
        assert!(cache.contains_fresh("containers"));

        advance(Duration::from_millis(4001)).await;
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains_fresh("containers"));
        assert!(cache.is_empty());
        assert!(!cache.contains_fresh("absent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_captured_at_does_not_evict() {
        let cache = ExpiringCache::new();
        cache.set("system-metrics", 7u8, Duration::from_secs(1));
        let stamp = cache.captured_at("system-metrics");

        advance(Duration::from_secs(5)).await;
        assert_eq!(cache.captured_at("system-metrics"), stamp);
        assert_eq!(cache.len(), 1);
    }
}
