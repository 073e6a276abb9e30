// src/telemetry/flush.rs
//! Size/time flush decision
//!
//! Ready when more than `size_threshold` records are buffered or more than
//! `max_elapsed` has passed since the last flush. The last flush time starts
//! at the epoch, so the first check is always ready. Recording the send time
//! is a separate step taken only after a flush actually happened.

use crate::utils::time::{epoch, Clock};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct FlushScheduler {
    clock: Arc<dyn Clock>,
    max_elapsed: chrono::Duration,
    size_threshold: usize,
    last_flush: DateTime<Utc>,
}

impl FlushScheduler {
    pub fn new(clock: Arc<dyn Clock>, max_elapsed: Duration, size_threshold: usize) -> Self {
        Self {
            clock,
            max_elapsed: chrono::Duration::from_std(max_elapsed).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            size_threshold,
            last_flush: epoch(),
        }
    }

    pub fn is_ready(&self, buffered: usize) -> bool {
        if buffered > self.size_threshold {
            debug!("Flush ready: {} records buffered", buffered);
            return true;
        }
        self.last_flush
            .checked_add_signed(self.max_elapsed)
            .map_or(false, |deadline| self.clock.now() > deadline)
    }

    /// Record that a flush just happened.
    pub fn update_send_time(&mut self) {
        self.last_flush = self.clock.now();
    }

    pub fn last_flush(&self) -> DateTime<Utc> {
        self.last_flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;

    fn scheduler(clock: &ManualClock) -> FlushScheduler {
        FlushScheduler::new(Arc::new(clock.clone()), Duration::from_secs(10), 100)
    }

    #[test]
    fn test_first_check_is_ready() {
        let clock = ManualClock::new(epoch() + chrono::Duration::seconds(1_000));
        assert!(scheduler(&clock).is_ready(0));
    }

    #[test]
    fn test_threshold_law() {
        let clock = ManualClock::new(epoch() + chrono::Duration::seconds(1_000));
        let mut scheduler = scheduler(&clock);
        scheduler.update_send_time();

        assert!(!scheduler.is_ready(100));
        assert!(scheduler.is_ready(101));

        clock.advance(Duration::from_secs(10));
        assert!(!scheduler.is_ready(0));

        clock.advance(Duration::from_millis(1));
        assert!(scheduler.is_ready(0));
    }

    #[test]
    fn test_readiness_does_not_reset_timer() {
        let clock = ManualClock::new(epoch() + chrono::Duration::seconds(1_000));
        let mut scheduler = scheduler(&clock);
        scheduler.update_send_time();
        clock.advance(Duration::from_secs(11));

        assert!(scheduler.is_ready(0));
        assert!(scheduler.is_ready(0));

        scheduler.update_send_time();
        assert!(!scheduler.is_ready(0));
    }
}
