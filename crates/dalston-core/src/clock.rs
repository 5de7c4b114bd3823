// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time, used for heartbeat-age
/// and reconcile-threshold assertions that would otherwise be flaky
/// against wall-clock time.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { current: Arc::new(Mutex::new(Utc::now())) }
    }

    pub fn at(when: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(when)) }
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    pub fn set(&self, when: DateTime<Utc>) {
        *self.current.lock() = when;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(61));
    }
}
