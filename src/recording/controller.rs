// src/recording/controller.rs
//! Recording lifecycle state machine
//!
//! ```text
//! Uninitialized ──connect (wait forever)──► Connected ──start (bounded)──► Recording
//!                                                                           │    ▲
//!                                                     snapshot fault        ▼    │ reacquired
//!                                                                        Reconnecting
//!                                                                           │
//!                         shutdown flag / exhausted backoff / shape fault   ▼
//!                                                                         Shutdown
//! ```
//!
//! One iteration: check the shutdown flag, sleep the harvest interval, take a
//! snapshot, hand it to the worker pool. Only one snapshot is in flight on the
//! controller at a time; shipping happens on the pool.

use crate::connection::backoff::BackoffPolicy;
use crate::observability::RECONNECTS_TOTAL;
use crate::recording::session::{RecordingSession, SessionFactory};
use crate::recording::strategy::SnapshotFile;
use crate::ship::worker_pool::HarvestWorkerPool;
use crate::utils::errors::Result;
use crate::utils::time::Sleeper;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Where the controller is in the recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Connected,
    Recording,
    Reconnecting,
    Shutdown,
}

/// Cooperative shutdown flag shared between the controller and signal
/// handlers
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown() {
            return;
        }
        notified.await;
    }
}

/// Consumer of produced snapshots, run on the worker pool
#[async_trait]
pub trait SnapshotHandler: Send + Sync + 'static {
    async fn handle_snapshot(&self, snapshot: SnapshotFile);
}

/// Drives the recording lifecycle
pub struct RecordingController {
    factory: SessionFactory,
    handler: Arc<dyn SnapshotHandler>,
    pool: Option<HarvestWorkerPool>,
    sleeper: Arc<dyn Sleeper>,
    harvest_interval: Duration,
    initial_policy: BackoffPolicy,
    shutdown: ShutdownHandle,
    state: ControllerState,
}

impl RecordingController {
    pub fn new(
        factory: SessionFactory,
        handler: Arc<dyn SnapshotHandler>,
        pool: HarvestWorkerPool,
        sleeper: Arc<dyn Sleeper>,
        harvest_interval: Duration,
    ) -> Self {
        Self {
            factory,
            handler,
            pool: Some(pool),
            sleeper,
            harvest_interval,
            initial_policy: BackoffPolicy::wait_forever(),
            shutdown: ShutdownHandle::new(),
            state: ControllerState::Uninitialized,
        }
    }

    /// Policy for the very first connection (default: wait forever)
    pub fn with_initial_policy(mut self, policy: BackoffPolicy) -> Self {
        self.initial_policy = policy;
        self
    }

    /// Share an existing shutdown flag (e.g. with the queued consumer)
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Run until shutdown or a fatal fault. The worker pool is drained before
    /// returning either way.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_loop().await;
        self.state = ControllerState::Shutdown;

        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }

        match &result {
            Ok(()) => info!("Recording controller stopped"),
            Err(e) => error!("Recording controller failed: {}", e),
        }
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();

        let connection = tokio::select! {
            biased;
            _ = shutdown.wait() => return Ok(()),
            connection = self.factory.connect(&self.initial_policy) => connection?,
        };
        self.state = ControllerState::Connected;

        let mut session = self.factory.start_on(connection).await?;
        self.state = ControllerState::Recording;
        info!("Harvesting every {:?}", self.harvest_interval);

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = self.sleeper.sleep(self.harvest_interval) => {}
            }

            match session.produce_snapshot().await {
                Ok(snapshot) => self.dispatch(snapshot),
                Err(e) if e.is_fatal() => {
                    session.close().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Snapshot failed, reconnecting: {}", e);
                    session = self.reconnect(session).await?;
                }
            }
        }

        debug!("Shutdown requested, closing recording {}", session.handle().id);
        session.close().await;
        Ok(())
    }

    async fn reconnect(&mut self, failed: RecordingSession) -> Result<RecordingSession> {
        self.state = ControllerState::Reconnecting;
        metrics::counter!(RECONNECTS_TOTAL).increment(1);
        failed.close().await;

        let session = self.factory.reacquire().await?;
        self.state = ControllerState::Recording;
        info!("Recording reacquired (id {})", session.handle().id);
        Ok(session)
    }

    fn dispatch(&self, snapshot: SnapshotFile) {
        let Some(pool) = self.pool.as_ref() else {
            snapshot.discard();
            return;
        };

        let handler = Arc::clone(&self.handler);
        if let Err(e) = pool.submit(async move { handler.handle_snapshot(snapshot).await }) {
            error!("Unable to queue snapshot: {}", e);
        }
    }
}
