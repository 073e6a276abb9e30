// src/observability/mod.rs
//! Logging and metrics setup
//!
//! - `init_tracing`: `tracing-subscriber` with an `EnvFilter` (`RUST_LOG`
//!   overrides the configured level), pretty or JSON output
//! - `init_metrics`: Prometheus scrape endpoint for the `metrics` facade
//!
//! Counter names used across the pipeline live here so dashboards have a
//! single place to look.

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{DaemonError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Snapshots produced by the recording session
pub const SNAPSHOTS_TOTAL: &str = "harvest_snapshots_total";

/// Raw events accepted by the watermark filter
pub const EVENTS_FORWARDED_TOTAL: &str = "harvest_events_forwarded_total";

/// Raw events dropped as duplicates
pub const EVENTS_DROPPED_TOTAL: &str = "harvest_events_dropped_total";

/// Mapper failures
pub const CONVERSION_ERRORS_TOTAL: &str = "harvest_conversion_errors_total";

/// Batches handed to the sender
pub const BATCHES_SENT_TOTAL: &str = "harvest_batches_sent_total";

/// Session reacquisitions after a snapshot fault
pub const RECONNECTS_TOTAL: &str = "harvest_reconnects_total";

/// Install the global tracing subscriber.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| DaemonError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = match config.log_format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| DaemonError::ConfigError(format!("Failed to install subscriber: {}", e)))
}

/// Install the Prometheus recorder when a metrics port is configured.
///
/// Without a port the `metrics` macros stay no-ops.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(port) = config.metrics_port else {
        return Ok(());
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DaemonError::ConfigError(format!("Failed to start metrics exporter: {}", e)))?;

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_port() {
        let config = ObservabilityConfig::default();
        assert!(init_metrics(&config).is_ok());
    }
}
