//! Wall-clock access.
//!
//! Components never read the system clock directly; they are handed a [`TimeService`] so that
//! time-based behavior (shard deltas, flush intervals, cache expiry) can be driven in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait TimeService: Send + Sync {
    fn current_time_micros(&self) -> u64;

    fn current_time_millis(&self) -> u64 {
        self.current_time_micros() / 1_000
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn current_time_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeService {
    micros: AtomicU64,
}

impl ManualTimeService {
    pub fn new(start_millis: u64) -> Self {
        Self {
            micros: AtomicU64::new(start_millis * 1_000),
        }
    }

    pub fn advance_millis(&self, millis: u64) {
        self.micros.fetch_add(millis * 1_000, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: u64) {
        self.micros.store(millis * 1_000, Ordering::SeqCst);
    }
}

impl TimeService for ManualTimeService {
    fn current_time_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}
