// src/main.rs
//! harvestd
//!
//! Attaches to the configured target, keeps a recording running there and
//! ships harvested telemetry until Ctrl-C / SIGTERM or a fatal fault.

use anyhow::{Context, Result};
use harvest_daemon::connection::grpc::{GrpcConnector, GrpcConnectorConfig};
use harvest_daemon::connection::supervisor::{ConnectionSupervisor, RetryContext};
use harvest_daemon::convert::{ConversionDispatcher, MapperRegistry};
use harvest_daemon::harvest::decoder::JsonLinesDecoder;
use harvest_daemon::harvest::queue::raw_event_queue;
use harvest_daemon::observability::{init_metrics, init_tracing};
use harvest_daemon::recording::{
    CopyStrategy, RecordingController, RecordingSettings, SessionFactory, ShutdownHandle,
    SnapshotStrategy, StreamStrategy,
};
use harvest_daemon::ship::{
    ConversionState, Delivery, HarvestWorkerPool, HttpSender, LogSender, QueuedConsumer,
    TelemetrySender, Uploader,
};
use harvest_daemon::telemetry::{CommonAttributes, EntityGuidResolver, FlushScheduler};
use harvest_daemon::utils::config::{DaemonConfig, DeliveryMode, SnapshotStrategyKind};
use harvest_daemon::utils::time::{SystemClock, TokioSleeper};
use harvest_daemon::BuildInfo;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let build = BuildInfo::current();
    info!(
        "Starting harvestd v{} ({}, built {} with {})",
        build.version, build.git_hash, build.build_timestamp, build.rustc_version
    );
    info!(
        "Target {}, harvest interval {:?}, {:?} strategy, {:?} delivery",
        config.target.endpoint(),
        config.recording.harvest_interval(),
        config.recording.strategy,
        config.pipeline.mode
    );

    // Connection
    let retry = RetryContext::new(
        Arc::new(TokioSleeper),
        Arc::new(SystemClock),
        config.retry.log_interval(),
    );
    let connector = GrpcConnector::new(GrpcConnectorConfig {
        endpoint: config.target.endpoint(),
        connect_timeout: config.target.connect_timeout(),
        max_block_size: config.recording.stream_block_size,
    });
    let supervisor = ConnectionSupervisor::new(Arc::new(connector), retry);

    // Identity
    let common = Arc::new(CommonAttributes::resolve(
        &config.telemetry.app_name,
        config.telemetry.hostname.as_deref(),
    ));
    let resolver = config
        .telemetry
        .resolve_entity_guid
        .then(|| EntityGuidResolver::new(supervisor.clone(), Arc::clone(&common)).spawn());

    // Shipping
    let sender: Arc<dyn TelemetrySender> =
        if config.telemetry.metrics_uri.is_none() && config.telemetry.events_uri.is_none() {
            warn!("No ingest URIs configured, telemetry will only be logged");
            Arc::new(LogSender)
        } else {
            Arc::new(HttpSender::new(&config.telemetry)?)
        };

    let conversion_state = || {
        ConversionState::new(
            ConversionDispatcher::new(MapperRegistry::default_registry(), Arc::new(SystemClock)),
            Arc::clone(&common),
            FlushScheduler::new(
                Arc::new(SystemClock),
                config.pipeline.flush_interval(),
                config.pipeline.flush_size_threshold,
            ),
        )
    };

    let shutdown = ShutdownHandle::new();
    // Set only once the controller has drained its in-flight harvests.
    let consumer_stop = ShutdownHandle::new();
    let (delivery, consumer) = match config.pipeline.mode {
        DeliveryMode::Direct => (Delivery::Direct(Arc::new(Mutex::new(conversion_state()))), None),
        DeliveryMode::Queued => {
            let (tx, rx) = raw_event_queue(config.pipeline.queue_capacity);
            let consumer = QueuedConsumer::new(
                rx,
                conversion_state(),
                Arc::clone(&sender),
                config.pipeline.poll_timeout(),
                consumer_stop.clone(),
            )
            .spawn(tokio::runtime::Handle::current())?;
            (Delivery::Queued(tx), Some(consumer))
        }
    };

    let uploader = Arc::new(
        Uploader::new(Arc::new(JsonLinesDecoder), delivery, sender).with_strict_cleanup(config.pipeline.strict_cleanup),
    );

    // Recording
    let snapshot_directory = config.recording.snapshot_directory();
    let strategy: Arc<dyn SnapshotStrategy> = match config.recording.strategy {
        SnapshotStrategyKind::Stream => Arc::new(StreamStrategy::new(
            snapshot_directory,
            config.recording.stream_block_size,
        )),
        SnapshotStrategyKind::Copy => Arc::new(CopyStrategy::new(snapshot_directory)),
    };
    let factory = SessionFactory::new(
        supervisor,
        RecordingSettings::new(
            config.recording.recording_name.clone(),
            config.recording.profile.clone(),
            config.recording.max_age(),
        ),
        strategy,
        config.retry.bounded_policy(),
    );

    let mut controller = RecordingController::new(
        factory,
        uploader.clone(),
        HarvestWorkerPool::new(config.pipeline.worker_threads),
        Arc::new(TokioSleeper),
        config.recording.harvest_interval(),
    )
    .with_initial_policy(config.retry.wait_forever_policy())
    .with_shutdown(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Received shutdown signal, finishing current harvest...");
            shutdown.shutdown();
        }
    });

    // Returns after the worker pool drained, so no harvest pushes after this.
    let result = controller.run().await;

    uploader.finish().await;
    consumer_stop.shutdown();
    if let Some(consumer) = consumer {
        match tokio::task::spawn_blocking(move || consumer.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Queued consumer panicked"),
            Err(e) => error!("Unable to join queued consumer: {}", e),
        }
    }
    if let Some(resolver) = resolver {
        resolver.abort();
    }

    match result {
        Ok(()) => {
            info!("harvestd stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("harvestd stopped on fatal error: {}", e);
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
