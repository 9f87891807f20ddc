//! Refresh trigger policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::debug;

use crate::clock::Clock;
use crate::config::RefreshConfig;

#[derive(Debug)]
struct RefreshCounter {
    request_count: u64,
    last_refresh: Instant,
}

/// Decides, once per selection, whether the whitelist is due for a refresh.
///
/// The decision only touches two counters under a short mutex. When a refresh
/// is due the scheduler wakes the refresher task and returns immediately, so
/// no selection ever waits on the coordination service or the file system.
#[derive(Debug)]
pub struct RefreshScheduler {
    counter: Mutex<RefreshCounter>,
    in_flight: AtomicBool,
    request_threshold: u64,
    interval: Duration,
    clock: Arc<dyn Clock>,
    wake: Notify,
}

impl RefreshScheduler {
    /// A scheduler whose interval starts now.
    pub fn new(config: &RefreshConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            counter: Mutex::new(RefreshCounter {
                request_count: 0,
                last_refresh: now,
            }),
            in_flight: AtomicBool::new(false),
            request_threshold: config.request_threshold,
            interval: config.interval(),
            clock,
            wake: Notify::new(),
        }
    }

    /// Count one selection and trigger a refresh if one is due.
    ///
    /// The call is counted first, so with a threshold of `n` the `n`th
    /// selection triggers. Returns `true` when this call triggered the
    /// refresh. A due refresh is skipped while another one is still running.
    pub fn tick(&self) -> bool {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.request_count = counter.request_count.saturating_add(1);
        let now = self.clock.now();
        let due = counter.request_count >= self.request_threshold
            || now.saturating_duration_since(counter.last_refresh) >= self.interval;

        if !due || self.in_flight.swap(true, Ordering::AcqRel) {
            return false;
        }

        debug!(requests = counter.request_count, "whitelist refresh due");
        counter.request_count = 0;
        counter.last_refresh = now;
        drop(counter);

        self.wake.notify_one();
        true
    }

    /// Trigger a refresh regardless of counters, unless one is running.
    pub fn request_now(&self) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.request_count = 0;
        counter.last_refresh = self.clock.now();
        drop(counter);

        self.wake.notify_one();
        true
    }

    /// Wait until a refresh has been triggered.
    pub async fn triggered(&self) {
        self.wake.notified().await;
    }

    /// Mark the running refresh as finished, successful or not.
    pub fn complete(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// Whether a triggered refresh has not completed yet.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Selections counted since the last refresh.
    pub fn request_count(&self) -> u64 {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_count
    }
}

/// A shared reference to the scheduler.
pub type SharedRefreshScheduler = Arc<RefreshScheduler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler(threshold: u64, interval_ms: u64) -> (RefreshScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = RefreshConfig {
            request_threshold: threshold,
            interval_ms,
        };
        (RefreshScheduler::new(&config, clock.clone()), clock)
    }

    #[test]
    fn triggers_on_request_volume() {
        let (scheduler, _clock) = scheduler(3, 60_000);
        assert!(!scheduler.tick());
        assert!(!scheduler.tick());
        assert_eq!(scheduler.request_count(), 2);

        assert!(scheduler.tick());
        assert_eq!(scheduler.request_count(), 0);
        assert!(scheduler.is_refreshing());
    }

    #[test]
    fn triggers_on_elapsed_time() {
        let (scheduler, clock) = scheduler(10_000, 2_000);
        assert!(!scheduler.tick());

        clock.advance(Duration::from_millis(1_999));
        assert!(!scheduler.tick());

        clock.advance(Duration::from_millis(1));
        assert!(scheduler.tick());
    }

    #[test]
    fn skips_while_a_refresh_is_running() {
        let (scheduler, clock) = scheduler(10_000, 2_000);
        clock.advance(Duration::from_secs(3));
        assert!(scheduler.tick());

        clock.advance(Duration::from_secs(3));
        assert!(!scheduler.tick());
        assert_eq!(scheduler.request_count(), 1);

        scheduler.complete();
        assert!(scheduler.tick());
    }

    #[test]
    fn request_now_ignores_counters() {
        let (scheduler, _clock) = scheduler(10_000, 60_000);
        assert!(scheduler.request_now());
        assert!(!scheduler.request_now());
        scheduler.complete();
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test]
    async fn trigger_wakes_a_later_waiter() {
        let (scheduler, clock) = scheduler(10_000, 1);
        clock.advance(Duration::from_millis(5));
        assert!(scheduler.tick());

        tokio::time::timeout(Duration::from_secs(1), scheduler.triggered())
            .await
            .unwrap();
    }
}
