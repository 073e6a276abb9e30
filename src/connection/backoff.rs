// src/connection/backoff.rs
//! Exponential backoff
//!
//! `wait = factor * 2^attempt`, capped at `max_backoff`. A bounded policy
//! returns `None` once `max_retries` waits have been handed out; an unbounded
//! one keeps returning the cap forever.

use rand::Rng;
use std::time::Duration;

/// Shape of a retry schedule
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Base wait, doubled per attempt
    pub backoff_factor: Duration,

    /// Upper bound for any single wait
    pub max_backoff: Duration,

    /// Waits handed out before giving up (`None` = never give up)
    pub max_retries: Option<u32>,

    /// Random spread applied to each wait, as a fraction (0.0 - 1.0)
    pub jitter_percent: f64,
}

impl BackoffPolicy {
    pub fn new(backoff_factor: Duration, max_backoff: Duration, max_retries: Option<u32>) -> Self {
        Self {
            backoff_factor,
            max_backoff,
            max_retries,
            jitter_percent: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: f64) -> Self {
        self.jitter_percent = jitter_percent.clamp(0.0, 1.0);
        self
    }

    /// 1s doubling up to 15s, forever
    pub fn wait_forever() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(15), None)
    }

    /// 1s doubling up to 15s, five attempts
    pub fn default_bounded() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(15), Some(5))
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_retries.is_none()
    }

    /// Fresh schedule at attempt zero
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            tries: 0,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::default_bounded()
    }
}

/// Running schedule produced by [`BackoffPolicy::start`]
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    tries: u32,
}

impl Backoff {
    /// Next wait, or `None` when the policy is exhausted.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_retries {
            if self.tries >= max {
                return None;
            }
        }

        let exponent = self.tries.min(31);
        let base = self
            .policy
            .backoff_factor
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.policy.max_backoff)
            .min(self.policy.max_backoff);

        self.tries = self.tries.saturating_add(1);
        Some(self.apply_jitter(base))
    }

    /// Waits handed out so far
    pub fn attempts(&self) -> u32 {
        self.tries
    }

    fn apply_jitter(&self, wait: Duration) -> Duration {
        if self.policy.jitter_percent <= 0.0 {
            return wait;
        }
        let spread = self.policy.jitter_percent;
        let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
        wait.mul_f64(factor).min(self.policy.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: &[u64]) -> Vec<Duration> {
        s.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_bounded_sequence() {
        let mut backoff = BackoffPolicy::default_bounded().start();
        let waits: Vec<_> = std::iter::from_fn(|| backoff.next_wait()).collect();

        assert_eq!(waits, secs(&[1, 2, 4, 8, 15]));
        assert_eq!(backoff.attempts(), 5);
        assert!(backoff.next_wait().is_none());
    }

    #[test]
    fn test_zero_retries_exhausts_immediately() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(15), Some(0));
        assert!(policy.start().next_wait().is_none());
    }

    #[test]
    fn test_wait_forever_caps() {
        let mut backoff = BackoffPolicy::wait_forever().start();
        let waits: Vec<_> = (0..100).filter_map(|_| backoff.next_wait()).collect();

        assert_eq!(waits.len(), 100);
        assert_eq!(waits[..5], secs(&[1, 2, 4, 8, 15])[..]);
        assert!(waits[5..].iter().all(|w| *w == Duration::from_secs(15)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy::wait_forever().with_jitter(0.5);
        let mut backoff = policy.start();
        for _ in 0..50 {
            let wait = backoff.next_wait().unwrap();
            assert!(wait <= Duration::from_secs(15));
        }
    }
}
