//! Deferred one-shot task keyed by a generation counter
//!
//! Used for the post-gesture settle delay: every `schedule` supersedes the
//! previous one, `cancel` drops it, and `poll` fires at most once per
//! schedule once the delay has elapsed. Time is passed in by the caller so
//! the owner's clock stays the single source of truth.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Pending {
    generation: u64,
    due: Instant,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: u64,
    pending: Option<Pending>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, generation: 0, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the task to fire `delay` after `now`, superseding any pending one
    pub fn schedule(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.pending = Some(Pending { generation: self.generation, due: now + self.delay });
        self.generation
    }

    /// Drop the pending task, returning whether one was armed
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.pending.take().is_some()
    }

    /// Fire the pending task if it is due, returning its generation
    pub fn poll(&mut self, now: Instant) -> Option<u64> {
        let pending = self.pending?;
        if pending.generation != self.generation {
            self.pending = None;
            return None;
        }
        if now < pending.due {
            return None;
        }
        self.pending = None;
        Some(pending.generation)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(250);

    #[test]
    fn fires_once_after_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);

        let generation = debouncer.schedule(start);
        assert_eq!(debouncer.poll(start + Duration::from_millis(249)), None);
        assert_eq!(debouncer.poll(start + DELAY), Some(generation));
        assert_eq!(debouncer.poll(start + DELAY * 2), None);
    }

    #[test]
    fn rescheduling_pushes_the_deadline_back() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.schedule(start);
        let later = debouncer.schedule(start + Duration::from_millis(200));

        assert_eq!(debouncer.poll(start + DELAY), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(450)), Some(later));
    }

    #[test]
    fn cancel_prevents_firing() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);

        debouncer.schedule(start);
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(start + DELAY * 4), None);
    }
}
