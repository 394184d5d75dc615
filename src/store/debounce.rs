//! Trailing-edge coalescing timer
//!
//! One instance per store, never shared. Re-arming cancels the prior arm, so
//! a burst of schedule calls collapses into a single fire once the burst goes
//! quiet.

use std::time::Duration;

use tokio::time::Instant;

/// A resettable single-shot deadline.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the timer: the deadline moves to `now + delay`,
    /// cancelling any earlier pending fire.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Drop any pending fire.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed. Does not disarm.
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if d <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_resets_deadline() {
        let mut debounce = Debounce::new(Duration::from_millis(300));
        debounce.arm();
        let first = debounce.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        debounce.arm();
        let second = debounce.deadline().unwrap();

        assert!(second > first);
        assert!(!debounce.is_due(Instant::now()));

        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(debounce.is_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let mut debounce = Debounce::new(Duration::from_millis(300));
        debounce.arm();
        debounce.cancel();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!debounce.is_armed());
        assert!(!debounce.is_due(Instant::now()));
    }
}
