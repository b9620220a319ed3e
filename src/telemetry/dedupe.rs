/// In-flight request deduplication
///
/// At most one pending operation exists per key. Concurrent callers for the
/// same key are handed the same shared future and observe the same outcome.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::error::FetchError;
use super::lock;

/// Awaitable outcome shared by every caller of one pending operation
pub type PendingOutcome<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

struct PendingOperation<T> {
    id: u64,
    outcome: PendingOutcome<T>,
}

type PendingTable<T> = Arc<Mutex<HashMap<String, PendingOperation<T>>>>;

pub struct RequestDeduplicator<T> {
    pending: PendingTable<T>,
    next_id: AtomicU64,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the outstanding operation for `key`, or start `operation` and
    /// register it.
    ///
    /// The registration is removed as soon as the operation settles, whether
    /// it succeeded, failed or panicked. `operation` is not invoked when
    /// joining, and is only invoked on first poll, outside the table lock, so
    /// it may call back into the same deduplicator.
    pub fn dedupe<F, Fut>(&self, key: &str, operation: F) -> PendingOutcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(key) {
            return existing.outcome.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(&self.pending);
        let owned_key = key.to_string();

        let outcome = async move {
            let result = AssertUnwindSafe(async move { operation().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FetchError::Aborted(panic_message(panic.as_ref()))));

            // A reset may already have replaced this registration
            let mut pending = lock(&table);
            if pending.get(&owned_key).map(|op| op.id) == Some(id) {
                pending.remove(&owned_key);
            }

            result
        }
        .boxed()
        .shared();

        pending.insert(
            key.to_string(),
            PendingOperation {
                id,
                outcome: outcome.clone(),
            },
        );

        outcome
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Forget every registration. Operations already running still settle
    /// for the callers holding them, but new callers start fresh.
    pub fn clear(&self) {
        lock(&self.pending).clear();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "operation panicked".to_string()
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
