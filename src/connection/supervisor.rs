// src/connection/supervisor.rs
//! Connection supervision and the generic retry loop
//!
//! [`RetryContext::retry`] runs an async operation until it succeeds, the
//! policy is exhausted, or it fails with a fault that must not be retried.
//! Failures are logged at `info` at most once per `log_interval` (every
//! attempt is still visible at `debug`), so an unreachable target does not
//! flood the log.

use crate::connection::backoff::BackoffPolicy;
use crate::connection::management::{Connector, ManagementConnection};
use crate::utils::errors::{DaemonError, Result};
use crate::utils::time::{Clock, Sleeper, SystemClock, TokioSleeper};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default spacing of "still retrying" log lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Time, sleep and log throttling shared by every retry loop
#[derive(Clone)]
pub struct RetryContext {
    pub sleeper: Arc<dyn Sleeper>,
    pub clock: Arc<dyn Clock>,
    pub log_interval: Duration,
}

impl Default for RetryContext {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
            log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

impl RetryContext {
    pub fn new(sleeper: Arc<dyn Sleeper>, clock: Arc<dyn Clock>, log_interval: Duration) -> Self {
        Self {
            sleeper,
            clock,
            log_interval,
        }
    }

    /// Run `op` under `policy`.
    ///
    /// Returns the first success, the first non-retryable fault unchanged, or
    /// [`DaemonError::BackoffExhausted`] wrapping the last fault.
    pub async fn retry<T, F, Fut>(&self, operation: &str, policy: &BackoffPolicy, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = policy.start();
        let mut throttle = LogThrottle::new(self.log_interval);
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let Some(wait) = backoff.next_wait() else {
                warn!("{} failed after {} attempts, giving up: {}", operation, attempts, err);
                return Err(DaemonError::BackoffExhausted {
                    operation: operation.to_string(),
                    attempts,
                    source: Box::new(err),
                });
            };

            if throttle.should_log(self.clock.now()) {
                info!("{} failed ({}), retrying in {:?}", operation, err, wait);
            } else {
                debug!("{} attempt {} failed ({}), retrying in {:?}", operation, attempts, err, wait);
            }

            self.sleeper.sleep(wait).await;
        }
    }
}

/// Lets one log line through per interval
#[derive(Debug)]
struct LogThrottle {
    interval: chrono::Duration,
    last: Option<DateTime<Utc>>,
}

impl LogThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval: chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero()),
            last: None,
        }
    }

    fn should_log(&mut self, now: DateTime<Utc>) -> bool {
        match self.last {
            Some(last) if now - last < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Obtains a management connection, retrying per policy
#[derive(Clone)]
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    retry: RetryContext,
}

impl ConnectionSupervisor {
    pub fn new(connector: Arc<dyn Connector>, retry: RetryContext) -> Self {
        Self { connector, retry }
    }

    pub fn retry_context(&self) -> &RetryContext {
        &self.retry
    }

    /// Connect, retrying per `policy`. Never fails under an unbounded policy
    /// unless the connector reports a non-retryable fault.
    pub async fn await_connection(&self, policy: &BackoffPolicy) -> Result<Arc<dyn ManagementConnection>> {
        let connector = self.connector.clone();
        let connection = self
            .retry
            .retry("connect to target", policy, || {
                let connector = connector.clone();
                async move { connector.connect().await }
            })
            .await?;

        info!("Connected to target management interface");
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fake::{FakeConnection, FakeConnector};
    use crate::utils::time::{epoch, ManualClock, RecordingSleeper};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> (RetryContext, RecordingSleeper) {
        let clock = ManualClock::new(epoch());
        let sleeper = RecordingSleeper::with_clock(clock.clone());
        let context = RetryContext::new(Arc::new(sleeper.clone()), Arc::new(clock), DEFAULT_LOG_INTERVAL);
        (context, sleeper)
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let (context, sleeper) = context();
        let calls = AtomicU32::new(0);

        let value = context
            .retry("op", &BackoffPolicy::default_bounded(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DaemonError::ConnectionFailed("down".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_wraps_last_fault() {
        let (context, sleeper) = context();

        let err = context
            .retry("start recording", &BackoffPolicy::default_bounded(), || async {
                Err::<(), _>(DaemonError::RecordingFailed("busy".into()))
            })
            .await
            .unwrap_err();

        match err {
            DaemonError::BackoffExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 6);
                assert!(matches!(*source, DaemonError::RecordingFailed(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sleeper.slept().len(), 5);
    }

    #[tokio::test]
    async fn test_shape_fault_not_retried() {
        let (context, sleeper) = context();
        let calls = AtomicU32::new(0);

        let err = context
            .retry("newRecording", &BackoffPolicy::wait_forever(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DaemonError::shape("newRecording", "long", "null")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DaemonError::ProtocolShape { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn test_log_throttle() {
        let mut throttle = LogThrottle::new(Duration::from_secs(10));
        let t0 = epoch();

        assert!(throttle.should_log(t0));
        assert!(!throttle.should_log(t0 + chrono::Duration::seconds(5)));
        assert!(throttle.should_log(t0 + chrono::Duration::seconds(10)));
    }

    #[tokio::test]
    async fn test_await_connection_after_refusals() {
        let (context, sleeper) = context();
        let connector = FakeConnector::to(FakeConnection::new())
            .then_refuse()
            .then_refuse();
        let connector = Arc::new(connector);
        let supervisor = ConnectionSupervisor::new(connector.clone(), context);

        supervisor
            .await_connection(&BackoffPolicy::wait_forever())
            .await
            .unwrap();

        assert_eq!(connector.attempts(), 3);
        assert_eq!(sleeper.slept().len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_connection_gives_up() {
        let (context, _) = context();
        let supervisor = ConnectionSupervisor::new(Arc::new(FakeConnector::refusing()), context);

        let err = supervisor
            .await_connection(&BackoffPolicy::default_bounded())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DaemonError::BackoffExhausted { .. }));
    }
}
