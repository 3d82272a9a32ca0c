//! Time source abstraction for TTL and backoff comparisons.
//!
//! The cache engine reads "now" through a [`Clock`] so that expiry and retry
//! gates can be exercised deterministically in tests. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] and advance it explicitly.
//!
//! All timestamps are epoch milliseconds, matching the key records' epoch
//! second expiries scaled by 1000.

use std::fmt;

use chrono::Utc;

/// Millisecond-resolution epoch time source.
///
/// Each cache operation reads the clock once per gate check so TTL and
/// backoff comparisons are self-consistent within one call.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock [`Clock`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // Pre-epoch wall clocks are not a supported configuration; clamp to 0.
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
///
/// Starts at the time given to [`ManualClock::at`] and only moves when
/// [`advance_ms`](ManualClock::advance_ms) or [`set_ms`](ManualClock::set_ms)
/// is called.
#[cfg(any(test, feature = "testutil"))]
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "testutil"))]
impl ManualClock {
    /// Creates a clock frozen at the given epoch milliseconds.
    #[must_use]
    pub fn at(now_ms: u64) -> Self {
        Self { now_ms: std::sync::atomic::AtomicU64::new(now_ms) }
    }

    /// Moves the clock forward by `delta_ms` milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, std::sync::atomic::Ordering::SeqCst);
    }

    /// Sets the clock to an absolute epoch millisecond value.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "testutil"))]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1_500);

        clock.set_ms(100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn test_system_clock_is_sane() {
        // 2020-01-01 in epoch milliseconds; any functioning wall clock is past it.
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
