//! Wall-clock sources.
//!
//! The timer works in epoch milliseconds so persisted end times survive a
//! process restart. `MonotonicClock` anchors the wall clock once and then
//! follows the tokio timer, which keeps tests deterministic under paused time.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Wall clock anchored at construction and advanced by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin_millis: i64,
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    /// Anchors at `origin_millis`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn starting_at(origin_millis: i64) -> Self {
        Self {
            origin_millis,
            origin: tokio::time::Instant::now(),
        }
    }

    /// Anchors at the current system time.
    #[must_use]
    pub fn from_system() -> Self {
        Self::starting_at(SystemClock.now_millis())
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> i64 {
        let elapsed = self.origin.elapsed().as_millis();
        self.origin_millis + i64::try_from(elapsed).unwrap_or(i64::MAX - self.origin_millis)
    }
}
