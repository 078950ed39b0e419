//! Cooperative cancellation for render jobs
//!
//! A [`CancellationToken`] is checked by a worker before it starts a job.
//! A [`Generation`] tags work with the epoch it was issued in, so results
//! that arrive after a teardown can be recognised and dropped.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation
///
/// Clones share the same underlying flag.
///
/// # Example
///
/// ```
/// use pageview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic epoch counter shared between an owner and its background work
///
/// Work captures [`current`](Self::current) when it is issued; the owner
/// calls [`advance`](Self::advance) to invalidate everything issued before.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    value: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Start a new epoch and return it
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_starts_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_across_threads() {
        let token = CancellationToken::new();
        let worker = token.clone();

        let handle = thread::spawn(move || {
            while !worker.is_cancelled() {
                thread::yield_now();
            }
        });

        token.cancel();
        token.cancel();
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_generation_invalidates_earlier_epochs() {
        let generation = Generation::new();
        let issued = generation.current();
        assert!(generation.is_current(issued));

        let next = generation.advance();
        assert_eq!(next, issued + 1);
        assert!(!generation.is_current(issued));
        assert!(generation.clone().is_current(next));
    }
}
