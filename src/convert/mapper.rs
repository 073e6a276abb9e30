// src/convert/mapper.rs
//! Mapper capabilities and their registry
//!
//! Three capability kinds turn raw events into telemetry:
//!
//! - [`MetricMapper`]: one event → zero or more metrics
//! - [`EventMapper`]: one event → zero or more telemetry events
//! - [`Summarizer`]: many events → one aggregate per flush window
//!
//! Each capability declares which events it handles through `test`.

use crate::harvest::event::RawEvent;
use crate::telemetry::record::{Metric, TelemetryEvent};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};

pub trait MetricMapper: Send + Sync {
    fn test(&self, event: &RawEvent) -> bool;
    fn apply(&self, event: &RawEvent) -> Result<Vec<Metric>>;
}

pub trait EventMapper: Send + Sync {
    fn test(&self, event: &RawEvent) -> bool;
    fn apply(&self, event: &RawEvent) -> Result<Vec<TelemetryEvent>>;
}

pub trait Summarizer: Send + Sync {
    fn test(&self, event: &RawEvent) -> bool;

    /// Fold one event into the current window.
    fn accept(&mut self, event: &RawEvent) -> Result<()>;

    /// Emit the window's aggregate and start a new, empty window.
    fn summarize(&mut self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<Metric>;
}

/// The capability set, built once at startup
#[derive(Default)]
pub struct MapperRegistry {
    pub(crate) metric_mappers: Vec<Box<dyn MetricMapper>>,
    pub(crate) event_mappers: Vec<Box<dyn EventMapper>>,
    pub(crate) summarizers: Vec<Box<dyn Summarizer>>,
}

impl MapperRegistry {
    pub fn builder() -> MapperRegistryBuilder {
        MapperRegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.metric_mappers.len() + self.event_mappers.len() + self.summarizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("metric_mappers", &self.metric_mappers.len())
            .field("event_mappers", &self.event_mappers.len())
            .field("summarizers", &self.summarizers.len())
            .finish()
    }
}

#[derive(Default)]
pub struct MapperRegistryBuilder {
    registry: MapperRegistry,
}

impl MapperRegistryBuilder {
    pub fn metric(mut self, mapper: impl MetricMapper + 'static) -> Self {
        self.registry.metric_mappers.push(Box::new(mapper));
        self
    }

    pub fn event(mut self, mapper: impl EventMapper + 'static) -> Self {
        self.registry.event_mappers.push(Box::new(mapper));
        self
    }

    pub fn summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
        self.registry.summarizers.push(Box::new(summarizer));
        self
    }

    pub fn build(self) -> MapperRegistry {
        self.registry
    }
}
