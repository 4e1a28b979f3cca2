//! Injected time source
//!
//! Fault records and status snapshots carry timestamps. Instead of calling
//! the system clock at the point of use, the controller reads time through
//! the `Clock` trait so tests can drive a deterministic, manually advanced
//! clock.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of timestamps for fault records and status snapshots.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The default for production controllers.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the Unix epoch.
    pub fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::epoch();
        let t0 = clock.now();
        clock.advance(Duration::milliseconds(100));
        assert_eq!(clock.now() - t0, Duration::milliseconds(100));
    }

    #[test]
    fn manual_clock_is_frozen_between_advances() {
        let clock = ManualClock::epoch();
        assert_eq!(clock.now(), clock.now());
    }
}
