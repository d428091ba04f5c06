//! Count of collectible chunks

use crate::trigger::Trigger;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::warn;

/// Lock-free counter of chunks in the gc index
///
/// Updated incrementally by admissions and evictions rather than recounted,
/// so it may briefly disagree with the index during a pass. Crossing
/// `capacity` requests a collection.
pub struct SizeAccountant {
    size: AtomicI64,
    capacity: i64,
    trigger: Trigger,
}

impl SizeAccountant {
    pub fn new(initial: i64, capacity: i64, trigger: Trigger) -> Self {
        Self {
            size: AtomicI64::new(initial),
            capacity,
            trigger,
        }
    }

    /// Add `delta` (negative to subtract) and return the new size
    pub fn increment(&self, delta: i64) -> i64 {
        let new = self.size.fetch_add(delta, Ordering::SeqCst) + delta;
        if new < 0 {
            warn!("Collectible chunk count went negative: {}", new);
        }
        if new >= self.capacity {
            self.trigger.request();
        }
        new
    }

    /// Record `count` newly admitted chunks
    pub fn on_admit(&self, count: i64) -> i64 {
        self.increment(count)
    }

    /// Record `count` chunks removed by a committed batch
    pub fn on_evicted(&self, count: i64) -> i64 {
        self.increment(-count)
    }

    pub fn value(&self) -> i64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_returns_new_value() {
        let accountant = SizeAccountant::new(0, 100, Trigger::new());
        assert_eq!(accountant.on_admit(10), 10);
        assert_eq!(accountant.on_admit(5), 15);
        assert_eq!(accountant.on_evicted(15), 0);
        assert_eq!(accountant.value(), 0);
    }

    #[test]
    fn test_crossing_capacity_arms_trigger() {
        let trigger = Trigger::new();
        let accountant = SizeAccountant::new(0, 10, trigger.clone());

        accountant.on_admit(9);
        assert!(!trigger.is_pending());

        accountant.on_admit(1);
        assert!(trigger.is_pending());

        // further admissions coalesce into the same request
        accountant.on_admit(5);
        assert!(trigger.try_consume());
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_eviction_above_capacity_rearms() {
        let trigger = Trigger::new();
        let accountant = SizeAccountant::new(30, 10, trigger.clone());

        accountant.on_evicted(5);
        assert!(trigger.try_consume());

        accountant.on_evicted(20);
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_concurrent_updates() {
        let accountant = Arc::new(SizeAccountant::new(0, i64::MAX, Trigger::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let accountant = accountant.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        accountant.on_admit(2);
                        accountant.on_evicted(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(accountant.value(), 8000);
    }
}
