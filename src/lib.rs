// src/lib.rs
//! Harvest daemon library
//!
//! Attaches to a remote runtime's management interface, keeps a continuous
//! diagnostic recording running there, and periodically harvests snapshots of
//! it into telemetry.
//!
//! # Architecture
//!
//! - **connection**: management transport, backoff and connection supervision
//! - **recording**: remote recording session, snapshot strategies and the
//!   lifecycle controller
//! - **harvest**: snapshot decoding, watermark dedup and the raw event queue
//! - **convert**: mapper capabilities and the conversion dispatcher
//! - **telemetry**: records, buffering, flush timing and common attributes
//! - **ship**: uploader, queued consumer, senders and the worker pool
//! - **observability**: logging and metrics setup
//! - **utils**: configuration, errors and injectable time

pub mod connection;
pub mod convert;
pub mod generated;
pub mod harvest;
pub mod observability;
pub mod recording;
pub mod ship;
pub mod telemetry;
pub mod utils;

pub use recording::controller::{RecordingController, ShutdownHandle};
pub use ship::uploader::Uploader;
pub use utils::config::DaemonConfig;
pub use utils::errors::{DaemonError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Daemon build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }

    /// `User-Agent` sent with telemetry requests
    pub fn user_agent(&self) -> String {
        format!("harvestd/{}", self.version)
    }
}
