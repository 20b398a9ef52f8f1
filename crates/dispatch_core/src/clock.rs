//! Time source for every TTL decision.
//!
//! Stores and the dispatcher never call `SystemTime` directly; they read an
//! injected [`Clock`] so tests and the scenario runner can move time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ONE_SEC_MS: u64 = 1000;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch (or since the start of a simulated run).
    fn now_ms(&self) -> u64;

    /// Absolute deadline `ttl` from now.
    fn deadline_after(&self, ttl: Duration) -> u64 {
        self.now_ms().saturating_add(ttl.as_millis() as u64)
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * ONE_SEC_MS);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(5_000);
        assert_eq!(clock.now_ms(), 5_000);

        clock.advance_secs(2);
        assert_eq!(clock.now_ms(), 7_000);
        assert_eq!(clock.deadline_after(Duration::from_secs(20)), 27_000);

        clock.set_ms(1);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn system_clock_is_past_the_epoch() {
        assert!(SystemClock.now_ms() > 0);
    }
}
