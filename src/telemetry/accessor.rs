/// Single-instance access to the collector
///
/// The application owns exactly one `CollectorSlot` at its composition root.
/// Everything else receives the collector from it, so re-entering a view or
/// reconnecting a client reuses the running instance instead of arming a
/// second set of timers.

use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::collector::TelemetryCollector;

/// Host environment signals the slot reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentEvent {
    /// The host finished starting up
    Ready,
    /// A consumer became visible again (client reconnect, terminal refocus)
    VisibilityRestored,
    /// Consumers went away but the process keeps running
    Hidden,
    /// The process is shutting down
    Teardown,
}

pub struct CollectorSlot {
    collector: OnceLock<Arc<TelemetryCollector>>,
}

impl CollectorSlot {
    pub const fn new() -> Self {
        Self {
            collector: OnceLock::new(),
        }
    }

    /// The one collector, built by `init` on first access
    pub fn get_or_init<F>(&self, init: F) -> Arc<TelemetryCollector>
    where
        F: FnOnce() -> TelemetryCollector,
    {
        Arc::clone(self.collector.get_or_init(|| Arc::new(init())))
    }

    pub fn get(&self) -> Option<Arc<TelemetryCollector>> {
        self.collector.get().cloned()
    }

    /// Apply an environment event. Does nothing before the collector exists.
    ///
    /// Returns whether the collector's running state changed.
    pub fn handle(&self, event: EnvironmentEvent) -> bool {
        let Some(collector) = self.collector.get() else {
            return false;
        };

        debug!(?event, running = collector.is_running(), "environment event");

        match event {
            EnvironmentEvent::Ready | EnvironmentEvent::VisibilityRestored => collector.start(),
            // Collection continues in the background
            EnvironmentEvent::Hidden => false,
            EnvironmentEvent::Teardown => collector.stop(),
        }
    }
}

impl Default for CollectorSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::scheduler::default_tiers;
    use crate::telemetry::testing::{FakeTransport, RecordingSink};
    use crate::utils::TierIntervals;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build() -> TelemetryCollector {
        TelemetryCollector::new(
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingSink::default()),
            default_tiers(&TierIntervals::default()),
        )
    }

    #[test]
    fn test_get_or_init_builds_once() {
        let slot = CollectorSlot::new();
        let builds = AtomicUsize::new(0);

        let first = slot.get_or_init(|| {
            builds.fetch_add(1, Ordering::SeqCst);
            build()
        });
        let second = slot.get_or_init(|| {
            builds.fetch_add(1, Ordering::SeqCst);
            build()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &slot.get().unwrap()));
    }

    #[test]
    fn test_events_before_init_are_ignored() {
        let slot = CollectorSlot::new();
        assert!(!slot.handle(EnvironmentEvent::Ready));
        assert!(slot.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_events() {
        let slot = CollectorSlot::new();
        let collector = slot.get_or_init(build);

        assert!(slot.handle(EnvironmentEvent::Ready));
        assert!(collector.is_running());

        // Hiding never stops collection
        assert!(!slot.handle(EnvironmentEvent::Hidden));
        assert!(collector.is_running());

        // Already running: nothing to restart
        assert!(!slot.handle(EnvironmentEvent::VisibilityRestored));
        assert_eq!(collector.armed_tiers(), 3);

        // Stopped from elsewhere, then visible again
        collector.stop();
        assert!(slot.handle(EnvironmentEvent::VisibilityRestored));
        assert!(collector.is_running());

        assert!(slot.handle(EnvironmentEvent::Teardown));
        assert!(!collector.is_running());
        assert!(!slot.handle(EnvironmentEvent::Teardown));
    }
}
