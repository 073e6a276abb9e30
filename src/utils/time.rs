// src/utils/time.rs
//! Injectable clock and sleep
//!
//! Retry loops, the flush scheduler and the summary windows all read time
//! through [`Clock`] and wait through [`Sleeper`], so tests can drive them
//! without real sleeps. The manual doubles only exist in test builds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use parking_lot::Mutex;
#[cfg(test)]
use std::sync::Arc;
use std::time::Duration;

/// The UNIX epoch as a UTC timestamp
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Asynchronous sleep
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually advanced clock for tests
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Sleeper that returns immediately, records every requested duration and
/// advances an optional [`ManualClock`] by the same amount.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
    clock: Option<ManualClock>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            slept: Arc::default(),
            clock: Some(clock),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(epoch().timestamp(), 0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(epoch());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now().timestamp(), 90);
    }

    #[tokio::test]
    async fn test_recording_sleeper_moves_clock() {
        let clock = ManualClock::new(epoch());
        let sleeper = RecordingSleeper::with_clock(clock.clone());

        sleeper.sleep(Duration::from_secs(2)).await;
        sleeper.sleep(Duration::from_secs(3)).await;

        assert_eq!(sleeper.slept(), vec![Duration::from_secs(2), Duration::from_secs(3)]);
        assert_eq!(clock.now().timestamp(), 5);
    }
}
