// src/recording/strategy.rs
//! Snapshot materialization
//!
//! A snapshot is a clone of the running recording written to a fresh local
//! file. Two ways to get the bytes:
//!
//! ```text
//! Stream: cloneRecording ─► openStream ─► readStream* ─► closeStream ─► closeRecording(clone)
//! Copy:   cloneRecording ─► copyTo(shared path) ─────────────────────► closeRecording(clone)
//! ```
//!
//! Every snapshot lives in its own directory (`harvest-<ulid>`) so cleanup
//! can remove the directory with the file.

use crate::connection::management::FlightRecorder;
use crate::recording::session::RecordingHandle;
use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Block size requested from the target when streaming
pub const DEFAULT_BLOCK_SIZE: usize = 5 * 1024 * 1024;

const DIR_PREFIX: &str = "harvest-";

/// A materialized snapshot and the temp directory that holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    dir: PathBuf,
    path: PathBuf,
}

impl SnapshotFile {
    /// Create `<root>/harvest-<ulid>/stream-<millis>.jfr` (empty).
    pub fn create_in(root: &Path) -> Result<Self> {
        let dir = root.join(format!("{}{}", DIR_PREFIX, ulid::Ulid::new()));
        std::fs::create_dir_all(&dir)?;

        let millis = chrono::Utc::now().timestamp_millis();
        let path = dir.join(format!("stream-{}.jfr", millis));
        if let Err(e) = std::fs::File::create(&path) {
            let _ = std::fs::remove_dir_all(&dir);
            return Err(e.into());
        }

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete the file, then its directory.
    pub fn remove(&self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|e| {
            DaemonError::CleanupFailed(format!("{}: {}", self.path.display(), e))
        })?;
        std::fs::remove_dir(&self.dir).map_err(|e| {
            DaemonError::CleanupFailed(format!("{}: {}", self.dir.display(), e))
        })
    }

    /// Best-effort removal of a partially written snapshot
    pub fn discard(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!("Unable to remove {}: {}", self.dir.display(), e);
        }
    }
}

/// How a snapshot of a running recording is brought to local disk
#[async_trait]
pub trait SnapshotStrategy: Send + Sync {
    async fn produce_snapshot(&self, recorder: &FlightRecorder, recording: RecordingHandle) -> Result<SnapshotFile>;
}

/// Clone the recording, then run `body`; the clone is closed either way.
/// A failed snapshot directory is discarded.
async fn with_clone<'a, F, Fut>(recorder: &'a FlightRecorder, recording: RecordingHandle, file: SnapshotFile, body: F) -> Result<SnapshotFile>
where
    F: FnOnce(i64, &'a FlightRecorder, PathBuf) -> Fut,
    Fut: std::future::Future<Output = Result<()>> + 'a,
{
    let clone_id = match recorder.clone_recording(recording.id).await {
        Ok(id) => id,
        Err(e) => {
            file.discard();
            return Err(e);
        }
    };

    let written = body(clone_id, recorder, file.path().to_path_buf()).await;
    let closed = recorder.close_recording(clone_id).await;

    match written.and(closed) {
        Ok(()) => Ok(file),
        Err(e) => {
            file.discard();
            Err(e)
        }
    }
}

/// Streams the clone over the management connection
#[derive(Debug, Clone)]
pub struct StreamStrategy {
    directory: PathBuf,
    block_size: usize,
}

impl StreamStrategy {
    pub fn new(directory: PathBuf, block_size: usize) -> Self {
        Self {
            directory,
            block_size,
        }
    }
}

#[async_trait]
impl SnapshotStrategy for StreamStrategy {
    async fn produce_snapshot(&self, recorder: &FlightRecorder, recording: RecordingHandle) -> Result<SnapshotFile> {
        let file = SnapshotFile::create_in(&self.directory)?;
        let block_size = self.block_size;

        with_clone(recorder, recording, file, move |clone_id, recorder, path| async move {
            let stream_id = recorder.open_stream(clone_id, block_size).await?;
            debug!("Streaming recording {} (stream {})", clone_id, stream_id);

            let copied = async {
                let mut out = tokio::fs::OpenOptions::new().append(true).open(&path).await?;
                let mut total = 0usize;
                while let Some(block) = recorder.read_stream(stream_id).await? {
                    out.write_all(&block).await?;
                    total += block.len();
                    if block.len() < block_size {
                        break;
                    }
                }
                out.flush().await?;
                Ok::<_, DaemonError>(total)
            }
            .await;

            // The stream is closed whether or not the copy worked.
            let closed = recorder.close_stream(stream_id).await;
            let total = copied?;
            closed?;
            debug!("Streamed {} bytes to {}", total, path.display());
            Ok(())
        })
        .await
    }
}

/// Has the target write the clone onto a filesystem both sides can see
#[derive(Debug, Clone)]
pub struct CopyStrategy {
    shared_directory: PathBuf,
}

impl CopyStrategy {
    pub fn new(shared_directory: PathBuf) -> Self {
        Self { shared_directory }
    }
}

#[async_trait]
impl SnapshotStrategy for CopyStrategy {
    async fn produce_snapshot(&self, recorder: &FlightRecorder, recording: RecordingHandle) -> Result<SnapshotFile> {
        let file = SnapshotFile::create_in(&self.shared_directory)?;

        with_clone(recorder, recording, file, |clone_id, recorder, path| async move {
            let target = path.to_string_lossy().into_owned();
            debug!("Copying recording {} to {}", clone_id, target);
            recorder.copy_to(clone_id, &target).await
        })
        .await
    }
}
