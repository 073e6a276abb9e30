// src/telemetry/mod.rs
//! Converted telemetry: records, buffering, flush timing and identity

pub mod attributes;
pub mod buffer;
pub mod entity;
pub mod flush;
pub mod record;

pub use attributes::{Attributes, CommonAttributes};
pub use buffer::{EventBatch, MetricBatch, TelemetryBuffer};
pub use entity::EntityGuidResolver;
pub use flush::FlushScheduler;
pub use record::{Metric, TelemetryEvent};
