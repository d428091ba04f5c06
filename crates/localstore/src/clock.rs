//! Strictly increasing timestamps for index keys

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock in nanoseconds that never repeats or goes backwards
///
/// Two admissions never share a gc priority key, even within the same
/// nanosecond or after the system clock steps back.
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    /// Clock whose next reading is greater than `floor`
    pub fn new(floor: u64) -> Self {
        Self {
            last: AtomicU64::new(floor),
        }
    }

    pub fn now(&self) -> u64 {
        let wall = current_timestamp_ns();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Get current timestamp in nanoseconds
fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
