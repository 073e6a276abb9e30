// src/convert/mod.rs
//! Raw event → telemetry conversion

pub mod builtin;
pub mod dispatcher;
pub mod mapper;
pub mod summary;

pub use dispatcher::ConversionDispatcher;
pub use mapper::{EventMapper, MapperRegistry, MetricMapper, Summarizer};
pub use summary::{DurationSummarizer, LongSummarizer};
