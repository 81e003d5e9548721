//! Time source abstraction.
//!
//! Lifecycle transitions stamp `embedding_updated_at`; injecting the clock
//! keeps those stamps deterministic in tests.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time as Unix milliseconds.
pub trait Clock {
    fn now(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually controlled clock for tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    #[must_use]
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }
}
