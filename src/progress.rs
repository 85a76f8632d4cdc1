use std::sync::{
    atomic::{AtomicBool, Ordering::Relaxed},
    Arc,
};

/// Incremental progress of a bulk operation, delivered through a plain
/// callback so drivers can render progress without the engine knowing
/// anything about their event loop.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ProgressEvent {
    /// Bulk fingerprint computation: `completed` of `total` files finished
    /// (successfully or not).
    Hashing { completed: usize, total: usize },

    /// Pairwise comparison during grouping.
    Comparing {
        pairs_compared: usize,
        total_pairs: usize,
    },
}

/// Cooperative cancellation flag, checked between frames while hashing and
/// between pairs while grouping.
///
/// Cancellation is not an error condition: completed fingerprints stay
/// cached and no partial state is ever persisted. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Relaxed)
    }
}
