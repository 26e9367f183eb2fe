//! Monotonic tick allocation
//!
//! Ticks serve both as log sequence numbers and as document revision
//! sources. The allocator is an explicit service handed to collaborators
//! rather than ambient global state; a single instance is shared per
//! database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide monotonic tick allocator.
///
/// Every call to `next` returns a strictly greater value than any tick
/// handed out before. `update_max` folds ticks observed during recovery
/// back into the allocator so new ticks never collide with replayed ones.
#[derive(Debug)]
pub struct TickSource {
    current: AtomicU64,
}

impl TickSource {
    /// Create an allocator starting above zero (tick 0 is reserved to
    /// mean "no revision supplied")
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU64::new(0),
        })
    }

    /// Allocate the next tick
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the most recently allocated tick without advancing
    pub fn peek(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Raise the allocator to at least `tick` (used after log replay)
    pub fn update_max(&self, tick: u64) {
        let mut observed = self.current.load(Ordering::SeqCst);
        while observed < tick {
            match self.current.compare_exchange(
                observed,
                tick,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ticks_are_strictly_increasing() {
        let ticks = TickSource::new();
        let a = ticks.next();
        let b = ticks.next();
        let c = ticks.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_first_tick_is_nonzero() {
        let ticks = TickSource::new();
        assert!(ticks.next() > 0);
    }

    #[test]
    fn test_update_max_never_lowers() {
        let ticks = TickSource::new();
        ticks.update_max(100);
        assert_eq!(ticks.peek(), 100);
        ticks.update_max(50);
        assert_eq!(ticks.peek(), 100);
        assert_eq!(ticks.next(), 101);
    }

    #[test]
    fn test_concurrent_allocation_has_no_duplicates() {
        let ticks = TickSource::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let source = Arc::clone(&ticks);
            handles.push(thread::spawn(move || {
                (0..1000).map(|_| source.next()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
    }
}
