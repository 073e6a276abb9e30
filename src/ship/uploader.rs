// src/ship/uploader.rs
//! Per-snapshot harvest and ship
//!
//! ```text
//! SnapshotFile ─► decode ─► watermark filter ─┬─ direct: convert ─► flush? ─► send batches
//!                                             └─ queued: push to RawEventQueue
//!              ─► delete file + temp dir (always last)
//! ```
//!
//! Decoding, filtering and conversion are blocking work and run on the
//! blocking pool. The filter and the direct conversion state sit behind
//! mutexes so two harvest workers share one dedup path.

use crate::convert::dispatcher::ConversionDispatcher;
use crate::harvest::decoder::SnapshotDecoder;
use crate::harvest::event::RawEvent;
use crate::harvest::queue::RawEventSender;
use crate::harvest::watermark::EventWatermarkFilter;
use crate::observability::EVENTS_FORWARDED_TOTAL;
use crate::recording::controller::SnapshotHandler;
use crate::recording::strategy::SnapshotFile;
use crate::ship::sender::TelemetrySender;
use crate::telemetry::attributes::CommonAttributes;
use crate::telemetry::buffer::TelemetryBuffer;
use crate::telemetry::flush::FlushScheduler;
use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Converter, buffer and flush schedule of one conversion path
pub struct ConversionState {
    dispatcher: ConversionDispatcher,
    buffer: TelemetryBuffer,
    scheduler: FlushScheduler,
    flush_in_flight: bool,
}

impl ConversionState {
    pub fn new(dispatcher: ConversionDispatcher, common: Arc<CommonAttributes>, scheduler: FlushScheduler) -> Self {
        Self {
            dispatcher,
            buffer: TelemetryBuffer::new(common),
            scheduler,
            flush_in_flight: false,
        }
    }

    pub fn convert(&mut self, event: &RawEvent) {
        self.dispatcher.process(event, &mut self.buffer);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.total_size()
    }

    /// When the scheduler says so, close the summary window and hand over
    /// the buffered records. At most one flush is outstanding at a time.
    pub fn take_if_ready(&mut self) -> Option<TelemetryBuffer> {
        if self.flush_in_flight || !self.scheduler.is_ready(self.buffer.total_size()) {
            return None;
        }
        Some(self.take_now())
    }

    /// Close the summary window and hand over everything, ready or not.
    pub fn take_now(&mut self) -> TelemetryBuffer {
        self.dispatcher.finish_cycle(&mut self.buffer);
        self.flush_in_flight = true;
        self.buffer.take()
    }

    /// Record that the flush handed out by `take_*` was sent.
    pub fn mark_sent(&mut self) {
        self.flush_in_flight = false;
        self.scheduler.update_send_time();
    }
}

/// Send each non-empty channel of `buffer` once. Send faults are logged.
pub(crate) async fn ship_buffer(sender: &dyn TelemetrySender, buffer: TelemetryBuffer) {
    let metrics = buffer.create_metric_batch();
    if !metrics.is_empty() {
        let count = metrics.len();
        match sender.send_metrics(metrics).await {
            Ok(()) => debug!("Sent {} metrics", count),
            Err(e) => error!("Failed to send {} metrics: {}", count, e),
        }
    }

    let events = buffer.create_event_batch();
    if !events.is_empty() {
        let count = events.len();
        match sender.send_events(events).await {
            Ok(()) => debug!("Sent {} events", count),
            Err(e) => error!("Failed to send {} events: {}", count, e),
        }
    }
}

/// Where accepted events go
pub enum Delivery {
    /// Convert on the harvest worker and flush from there
    Direct(Arc<Mutex<ConversionState>>),
    /// Hand to the queued consumer
    Queued(RawEventSender),
}

/// Harvests snapshot files and ships what they contain
pub struct Uploader {
    decoder: Arc<dyn SnapshotDecoder>,
    filter: Arc<Mutex<EventWatermarkFilter>>,
    delivery: Delivery,
    sender: Arc<dyn TelemetrySender>,
    strict_cleanup: bool,
}

impl Uploader {
    pub fn new(decoder: Arc<dyn SnapshotDecoder>, delivery: Delivery, sender: Arc<dyn TelemetrySender>) -> Self {
        Self {
            decoder,
            filter: Arc::new(Mutex::new(EventWatermarkFilter::new())),
            delivery,
            sender,
            strict_cleanup: false,
        }
    }

    /// Return deletion failures from [`handle_file`](Self::handle_file)
    /// instead of logging them.
    pub fn with_strict_cleanup(mut self, strict: bool) -> Self {
        self.strict_cleanup = strict;
        self
    }

    pub fn watermark(&self) -> chrono::DateTime<chrono::Utc> {
        self.filter.lock().watermark()
    }

    /// Harvest one snapshot, ship if due, then delete the file.
    pub async fn handle_file(&self, snapshot: SnapshotFile) -> Result<()> {
        match self.harvest(&snapshot).await {
            Ok(Some(buffer)) => self.flush(buffer).await,
            Ok(None) => {}
            Err(e) => warn!("Skipping snapshot {}: {}", snapshot.path().display(), e),
        }

        match snapshot.remove() {
            Ok(()) => Ok(()),
            Err(e) if self.strict_cleanup => Err(e),
            Err(e) => {
                warn!("Unable to delete snapshot: {}", e);
                Ok(())
            }
        }
    }

    /// Decode, dedup and deliver; returns a buffer when a flush is due.
    async fn harvest(&self, snapshot: &SnapshotFile) -> Result<Option<TelemetryBuffer>> {
        let decoder = Arc::clone(&self.decoder);
        let filter = Arc::clone(&self.filter);
        let path = snapshot.path().to_path_buf();
        let delivery = match &self.delivery {
            Delivery::Direct(state) => Delivery::Direct(Arc::clone(state)),
            Delivery::Queued(queue) => Delivery::Queued(queue.clone()),
        };

        tokio::task::spawn_blocking(move || -> Result<Option<TelemetryBuffer>> {
            let mut filter = filter.lock();
            let mut filtered = filter.scan(decoder.open(&path)?)?;
            let accepted = filtered.accepted.len();

            let ready = match delivery {
                Delivery::Direct(state) => {
                    let mut state = state.lock();
                    for event in &filtered.accepted {
                        state.convert(event);
                    }
                    state.take_if_ready()
                }
                Delivery::Queued(queue) => {
                    let events = std::mem::take(&mut filtered.accepted);
                    let first = events.first().map(|e| e.start_time);
                    let last = events.last().map(|e| e.start_time);
                    if let Err(e) = queue.push_all(events) {
                        // Watermark stays put so the next snapshot offers these again.
                        error!(
                            "{}: {} accepted events from {:?} to {:?} not queued: {}",
                            path.display(),
                            accepted,
                            first,
                            last,
                            e
                        );
                        return Err(e);
                    }
                    None
                }
            };

            filter.advance(&filtered);
            metrics::counter!(EVENTS_FORWARDED_TOTAL).increment(accepted as u64);
            debug!(
                "{}: {} events read, {} new (watermark {})",
                path.display(),
                filtered.dropped + accepted,
                accepted,
                filter.watermark()
            );
            Ok(ready)
        })
        .await
        .map_err(|e| DaemonError::DecodeFailed(format!("Harvest task failed: {}", e)))?
    }

    /// Final flush of whatever the direct path still buffers. Call once no
    /// more snapshots will be handled.
    pub async fn finish(&self) {
        let Delivery::Direct(state) = &self.delivery else {
            return;
        };

        let buffer = state.lock().take_now();
        if buffer.is_empty() {
            state.lock().mark_sent();
            return;
        }
        self.flush(buffer).await;
    }

    async fn flush(&self, buffer: TelemetryBuffer) {
        let Delivery::Direct(state) = &self.delivery else {
            return;
        };

        info!("Flushing {} records", buffer.total_size());
        ship_buffer(self.sender.as_ref(), buffer).await;
        state.lock().mark_sent();
    }
}

#[async_trait]
impl SnapshotHandler for Uploader {
    async fn handle_snapshot(&self, snapshot: SnapshotFile) {
        if let Err(e) = self.handle_file(snapshot).await {
            error!("Snapshot handling failed: {}", e);
        }
    }
}
