use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};

/// A lock-free cumulative counter of events.
///
/// The counter is only expected to grow, but the sign of a delta is never validated.
/// Negative deltas will decrease the total.
#[derive(Debug, Default)]
pub struct CumulativeCounter {
    total: AtomicI64,
}

impl CumulativeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the given delta to the total of this counter.
    pub fn incr(&self, delta: i64) {
        self.total.fetch_add(delta, Ordering::SeqCst);
    }

    /// Reset the total of this counter back to zero.
    pub fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
    }

    /// Get the total accumulated by this counter.
    pub fn value(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }
}

impl Display for CumulativeCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}
