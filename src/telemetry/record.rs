// src/telemetry/record.rs
//! Converted telemetry records

use crate::telemetry::attributes::Attributes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A converted metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Metric {
    /// Point-in-time value
    Gauge {
        name: String,
        value: f64,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
        attributes: Attributes,
    },

    /// Aggregate over a summary window
    Summary {
        name: String,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
        start: DateTime<Utc>,
        #[serde(rename = "interval.end", with = "chrono::serde::ts_milliseconds")]
        end: DateTime<Utc>,
        attributes: Attributes,
    },
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>, attributes: Attributes) -> Self {
        Metric::Gauge {
            name: name.into(),
            value,
            timestamp,
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::Gauge { name, .. } | Metric::Summary { name, .. } => name,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Metric::Gauge { attributes, .. } | Metric::Summary { attributes, .. } => attributes,
        }
    }
}

/// A converted telemetry event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub attributes: Attributes,
}

impl TelemetryEvent {
    pub fn new(event_type: impl Into<String>, timestamp: DateTime<Utc>, attributes: Attributes) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            attributes,
        }
    }
}
