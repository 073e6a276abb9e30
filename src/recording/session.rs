// src/recording/session.rs
//! One continuously running recording on the target
//!
//! The [`SessionFactory`] turns a connection into a started recording,
//! retrying the whole create/configure/start sequence under a bounded policy.
//! A [`RecordingSession`] then produces snapshots until it fails; the
//! controller discards it and asks the factory for a new one.

use crate::connection::backoff::BackoffPolicy;
use crate::connection::management::{FlightRecorder, ManagementConnection, RecordingOptions};
use crate::connection::supervisor::ConnectionSupervisor;
use crate::observability::SNAPSHOTS_TOTAL;
use crate::recording::strategy::{SnapshotFile, SnapshotStrategy};
use crate::utils::errors::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identifier of a recording on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingHandle {
    pub id: i64,
}

/// Recording parameters applied on every (re)start
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    /// Predefined configuration, e.g. `profile`
    pub profile: String,

    pub options: RecordingOptions,
}

impl RecordingSettings {
    pub fn new(name: impl Into<String>, profile: impl Into<String>, max_age: Duration) -> Self {
        Self {
            profile: profile.into(),
            options: RecordingOptions {
                name: name.into(),
                to_disk: true,
                max_age,
            },
        }
    }
}

/// A started recording and the connection it lives on
pub struct RecordingSession {
    recorder: FlightRecorder,
    handle: RecordingHandle,
    strategy: Arc<dyn SnapshotStrategy>,
}

impl RecordingSession {
    pub fn handle(&self) -> RecordingHandle {
        self.handle
    }

    /// Materialize the recording's current contents to a local file.
    ///
    /// Faults other than protocol shape mismatches come back as
    /// `RecordingFailed`.
    pub async fn produce_snapshot(&self) -> Result<SnapshotFile> {
        let snapshot = self
            .strategy
            .produce_snapshot(&self.recorder, self.handle)
            .await
            .map_err(|e| e.into_session_fault())?;

        metrics::counter!(SNAPSHOTS_TOTAL).increment(1);
        debug!("Snapshot written to {}", snapshot.path().display());
        Ok(snapshot)
    }

    /// Best-effort close of the remote recording and the connection
    pub async fn close(self) {
        if let Err(e) = self.recorder.close_recording(self.handle.id).await {
            debug!("Closing recording {} failed: {}", self.handle.id, e);
        }
        self.recorder.connection().close().await;
    }
}

/// Creates recording sessions
pub struct SessionFactory {
    supervisor: ConnectionSupervisor,
    settings: RecordingSettings,
    strategy: Arc<dyn SnapshotStrategy>,
    start_policy: BackoffPolicy,
    reconnect_policy: BackoffPolicy,
}

impl SessionFactory {
    pub fn new(
        supervisor: ConnectionSupervisor,
        settings: RecordingSettings,
        strategy: Arc<dyn SnapshotStrategy>,
        bounded_policy: BackoffPolicy,
    ) -> Self {
        Self {
            supervisor,
            settings,
            strategy,
            start_policy: bounded_policy.clone(),
            reconnect_policy: bounded_policy,
        }
    }

    /// Connect under `policy` without starting anything yet.
    pub async fn connect(&self, policy: &BackoffPolicy) -> Result<Arc<dyn ManagementConnection>> {
        self.supervisor.await_connection(policy).await
    }

    /// Connect under `connect_policy`, then start a recording.
    pub async fn start(&self, connect_policy: &BackoffPolicy) -> Result<RecordingSession> {
        let connection = self.connect(connect_policy).await?;
        self.start_on(connection).await
    }

    /// Replacement session after a failure: bounded connect, bounded start.
    pub async fn reacquire(&self) -> Result<RecordingSession> {
        let connection = self.supervisor.await_connection(&self.reconnect_policy).await?;
        self.start_on(connection).await
    }

    /// Start a recording on an established connection. The connection is
    /// closed if the recording cannot be started.
    pub async fn start_on(&self, connection: Arc<dyn ManagementConnection>) -> Result<RecordingSession> {
        let recorder = FlightRecorder::new(connection);

        let started = self
            .supervisor
            .retry_context()
            .retry("start recording", &self.start_policy, || {
                start_recording(&recorder, &self.settings)
            })
            .await;

        let id = match started {
            Ok(id) => id,
            Err(e) => {
                recorder.connection().close().await;
                return Err(e);
            }
        };

        info!(
            "Recording {} started ({}, maxAge {:?})",
            id, self.settings.profile, self.settings.options.max_age
        );
        Ok(RecordingSession {
            recorder,
            handle: RecordingHandle { id },
            strategy: Arc::clone(&self.strategy),
        })
    }
}

/// Create, configure and start one recording. A recording created by a failed
/// attempt is closed again.
async fn start_recording(recorder: &FlightRecorder, settings: &RecordingSettings) -> Result<i64> {
    let id = recorder.new_recording().await?;

    let configured = async {
        recorder.set_predefined_configuration(id, &settings.profile).await?;
        recorder.set_recording_options(id, &settings.options).await?;
        recorder.start_recording(id).await
    }
    .await;

    if let Err(e) = configured {
        if let Err(close_err) = recorder.close_recording(id).await {
            warn!("Unable to close half-started recording {}: {}", id, close_err);
        }
        return Err(e);
    }
    Ok(id)
}
