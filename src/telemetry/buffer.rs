// src/telemetry/buffer.rs
//! Converted-record buffer
//!
//! Two append-only channels, metrics and events. Batches are materialized at
//! flush time and carry whatever common attributes are current then.

use crate::telemetry::attributes::{Attributes, CommonAttributes};
use crate::telemetry::record::{Metric, TelemetryEvent};
use serde::Serialize;
use std::sync::Arc;

/// Attributes block shared by every record of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonBlock {
    pub attributes: Arc<Attributes>,
}

/// Immutable batch of metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricBatch {
    pub common: CommonBlock,
    pub metrics: Vec<Metric>,
}

impl MetricBatch {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }
}

/// Immutable batch of events
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    pub common: CommonBlock,
    pub events: Vec<TelemetryEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Accumulates records between flushes
#[derive(Debug)]
pub struct TelemetryBuffer {
    metrics: Vec<Metric>,
    events: Vec<TelemetryEvent>,
    common: Arc<CommonAttributes>,
}

impl TelemetryBuffer {
    pub fn new(common: Arc<CommonAttributes>) -> Self {
        Self {
            metrics: Vec::new(),
            events: Vec::new(),
            common,
        }
    }

    pub fn add_metric(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn add_event(&mut self, event: TelemetryEvent) {
        self.events.push(event);
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    /// Records in both channels
    pub fn total_size(&self) -> usize {
        self.metrics.len() + self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_size() == 0
    }

    /// Snapshot the metric channel. Does not clear it.
    pub fn create_metric_batch(&self) -> MetricBatch {
        MetricBatch {
            common: self.common_block(),
            metrics: self.metrics.clone(),
        }
    }

    /// Snapshot the event channel. Does not clear it.
    pub fn create_event_batch(&self) -> EventBatch {
        EventBatch {
            common: self.common_block(),
            events: self.events.clone(),
        }
    }

    /// Hand over the accumulated records, leaving an empty buffer behind.
    pub fn take(&mut self) -> TelemetryBuffer {
        TelemetryBuffer {
            metrics: std::mem::take(&mut self.metrics),
            events: std::mem::take(&mut self.events),
            common: Arc::clone(&self.common),
        }
    }

    fn common_block(&self) -> CommonBlock {
        CommonBlock {
            attributes: self.common.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::attributes::{APP_NAME, ENTITY_GUID};
    use crate::utils::time::epoch;

    fn buffer() -> (TelemetryBuffer, Arc<CommonAttributes>) {
        let common = Arc::new(CommonAttributes::new(Attributes::new().with(APP_NAME, "orders")));
        (TelemetryBuffer::new(Arc::clone(&common)), common)
    }

    #[test]
    fn test_batches_do_not_clear_channels() {
        let (mut buffer, _) = buffer();
        buffer.add_metric(Metric::gauge("g", 1.0, epoch(), Attributes::new()));
        buffer.add_event(TelemetryEvent::new("E", epoch(), Attributes::new()));

        assert_eq!(buffer.create_metric_batch().len(), 1);
        assert_eq!(buffer.create_event_batch().len(), 1);
        assert_eq!(buffer.total_size(), 2);
    }

    #[test]
    fn test_take_swaps_in_empty_buffer() {
        let (mut buffer, _) = buffer();
        buffer.add_metric(Metric::gauge("g", 1.0, epoch(), Attributes::new()));

        let taken = buffer.take();
        assert_eq!(taken.total_size(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.create_metric_batch().is_empty());
    }

    #[test]
    fn test_batch_uses_attributes_current_at_build_time() {
        let (buffer, common) = buffer();
        let early = buffer.create_metric_batch();

        common.merge(&Attributes::new().with(ENTITY_GUID, "guid-1"));
        let late = buffer.create_metric_batch();

        assert!(early.common.attributes.get(ENTITY_GUID).is_none());
        assert_eq!(late.common.attributes.get_str(ENTITY_GUID), Some("guid-1"));
    }
}
