// src/utils/config.rs
//! Daemon configuration
//!
//! Layered with the `config` crate:
//!
//! 1. built-in defaults (serde `default`)
//! 2. optional config file (`HARVEST_CONFIG`, default `harvestd.toml`)
//! 3. environment variables, `HARVEST__<SECTION>__<KEY>`
//!    (e.g. `HARVEST__TARGET__PORT=9010`)

use crate::connection::backoff::BackoffPolicy;
use crate::harvest::queue::DEFAULT_QUEUE_CAPACITY;
use crate::utils::errors::{DaemonError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";

/// Config file used when `HARVEST_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "harvestd.toml";

const ENV_PREFIX: &str = "HARVEST";

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Target process management endpoint
    pub target: TargetConfig,

    /// Remote recording settings
    pub recording: RecordingConfig,

    /// Backoff used for (re)connecting and (re)starting recordings
    pub retry: RetryConfig,

    /// Harvest-to-ship pipeline
    pub pipeline: PipelineConfig,

    /// Backend and identity
    pub telemetry: TelemetryConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl DaemonConfig {
    /// Load from the file named by `HARVEST_CONFIG` (if present) and the
    /// process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(&path, None)
    }

    /// Load from `path` (optional) and either the process environment or the
    /// given variables.
    pub fn load_from(path: &str, env: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: DaemonConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recording.harvest_interval_secs == 0 {
            return Err(DaemonError::ConfigError(
                "recording.harvest_interval_secs must be positive".into(),
            ));
        }
        if self.recording.stream_block_size == 0 {
            return Err(DaemonError::ConfigError(
                "recording.stream_block_size must be positive".into(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(DaemonError::ConfigError(
                "pipeline.queue_capacity must be positive".into(),
            ));
        }
        if self.pipeline.worker_threads == 0 {
            return Err(DaemonError::ConfigError(
                "pipeline.worker_threads must be positive".into(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.backoff_factor_ms {
            return Err(DaemonError::ConfigError(
                "retry.max_backoff_ms must not be below retry.backoff_factor_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Target process endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,

    /// Per-attempt connect timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1099,
            connect_timeout_secs: 5,
        }
    }
}

impl TargetConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How a snapshot is materialized locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStrategyKind {
    /// Read the clone over the management connection in blocks
    #[default]
    Stream,

    /// Ask the target to write the clone to a shared filesystem
    Copy,
}

/// Remote recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Harvest interval (seconds)
    pub harvest_interval_secs: u64,

    /// Snapshot strategy
    pub strategy: SnapshotStrategyKind,

    /// Where snapshot temp directories are created. Must be visible to the
    /// target when the copy strategy is used. Defaults to the system temp dir.
    pub snapshot_directory: Option<PathBuf>,

    /// Block size requested when streaming (bytes)
    pub stream_block_size: usize,

    /// Name given to the remote recording
    pub recording_name: String,

    /// Predefined configuration applied to the recording
    pub profile: String,

    /// Extra retention on top of the harvest interval (seconds)
    pub max_age_padding_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            harvest_interval_secs: 10,
            strategy: SnapshotStrategyKind::Stream,
            snapshot_directory: None,
            stream_block_size: 5 * 1024 * 1024,
            recording_name: "Harvest Daemon Recording".to_string(),
            profile: "profile".to_string(),
            max_age_padding_secs: 10,
        }
    }
}

impl RecordingConfig {
    pub fn harvest_interval(&self) -> Duration {
        Duration::from_secs(self.harvest_interval_secs)
    }

    /// Retention slightly larger than the harvest interval so nothing is
    /// lost between harvests.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.harvest_interval_secs + self.max_age_padding_secs)
    }

    pub fn snapshot_directory(&self) -> PathBuf {
        self.snapshot_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base wait, doubled per attempt (milliseconds)
    pub backoff_factor_ms: u64,

    /// Upper bound for a single wait (milliseconds)
    pub max_backoff_ms: u64,

    /// Attempts allowed by the bounded policy before giving up
    pub max_retries: u32,

    /// Random jitter as a fraction of each wait (0.0 disables)
    pub jitter_percent: f64,

    /// Minimum spacing between "still retrying" log lines (seconds)
    pub log_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_factor_ms: 1_000,
            max_backoff_ms: 15_000,
            max_retries: 5,
            jitter_percent: 0.0,
            log_interval_secs: 10,
        }
    }
}

impl RetryConfig {
    /// Policy used for steady-state reconnects and recording starts
    pub fn bounded_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_factor_ms),
            Duration::from_millis(self.max_backoff_ms),
            Some(self.max_retries),
        )
        .with_jitter(self.jitter_percent)
    }

    /// Policy used at startup: never gives up
    pub fn wait_forever_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_factor_ms),
            Duration::from_millis(self.max_backoff_ms),
            None,
        )
        .with_jitter(self.jitter_percent)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs)
    }
}

/// Where accepted raw events go after deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Convert on the harvest worker that decoded the snapshot
    #[default]
    Direct,

    /// Push into a bounded queue drained by a dedicated consumer
    Queued,
}

/// Harvest-to-ship pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: DeliveryMode,

    /// Raw event queue capacity (queued mode)
    pub queue_capacity: usize,

    /// Consumer poll timeout (milliseconds, queued mode)
    pub poll_timeout_ms: u64,

    /// Harvest worker pool size
    pub worker_threads: usize,

    /// Flush at least this often (seconds)
    pub flush_interval_secs: u64,

    /// Flush once more than this many records are buffered
    pub flush_size_threshold: usize,

    /// Return snapshot deletion failures instead of logging them
    pub strict_cleanup: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Direct,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout_ms: 1_000,
            worker_threads: 2,
            flush_interval_secs: 10,
            flush_size_threshold: 10_000,
            strict_cleanup: false,
        }
    }
}

impl PipelineConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Payload compression for the HTTP sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCompression {
    None,
    #[default]
    Zstd,
}

/// Backend endpoints and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Monitored application name
    pub app_name: String,

    /// Host name override; resolved from the OS when unset
    pub hostname: Option<String>,

    /// Metric ingest endpoint; no HTTP sender is built when both URIs are unset
    pub metrics_uri: Option<String>,

    /// Event ingest endpoint
    pub events_uri: Option<String>,

    /// Ingest key sent as `Api-Key`
    pub api_key: Option<String>,

    pub compression: PayloadCompression,

    /// Resolve the remote entity guid in the background
    pub resolve_entity_guid: bool,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            app_name: "My Application".to_string(),
            hostname: None,
            metrics_uri: None,
            events_uri: None,
            api_key: None,
            compression: PayloadCompression::Zstd,
            resolve_entity_guid: true,
            request_timeout_secs: 120,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and metrics exposition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,

    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}
