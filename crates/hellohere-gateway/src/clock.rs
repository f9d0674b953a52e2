//! Time source for message and activity timestamps.
//!
//! Message order within a room is the order of their timestamps and read
//! markers compare against them, so the production clock hands out strictly
//! increasing values, even if the wall clock steps backwards or two calls
//! land in the same millisecond.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }
}

/// Wall clock, clamped to be strictly increasing. A burst of calls within
/// one millisecond runs ahead of the wall clock until it catches up.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let next = |prev: i64| wall.max(prev.saturating_add(1));
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| Some(next(prev)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_never_goes_back() {
        let clock = SystemClock::new();
        let ahead = Utc::now().timestamp_millis() + 60_000;
        clock.last.store(ahead, Ordering::SeqCst);
        assert_eq!(clock.now_ms(), ahead + 1);
        assert_eq!(clock.now_ms(), ahead + 2);
    }

    #[test]
    fn test_system_clock_never_repeats() {
        let clock = SystemClock::new();
        let mut prev = clock.now_ms();
        for _ in 0..1_000 {
            let next = clock.now_ms();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(10);
        assert_eq!(clock.now().timestamp_millis(), 10);
    }
}
