// src/harvest/event.rs
//! Raw diagnostic event as decoded from a snapshot

use crate::utils::errors::{DaemonError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;

/// One decoded recording event
///
/// `fields` is opaque to the pipeline; only mappers look inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event type name, e.g. `jdk.CPULoad`
    #[serde(rename = "type")]
    pub event_type: String,

    /// Human readable label of the event type
    #[serde(default)]
    pub description: Option<String>,

    /// Event start time; the watermark orders on this
    pub start_time: DateTime<Utc>,

    /// Duration in nanoseconds for timed events
    #[serde(default)]
    pub duration_ns: Option<u64>,

    /// Event payload
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            description: None,
            start_time,
            duration_ns: None,
            fields: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ns = Some(duration.as_nanos().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// `description` or an empty string, for log lines
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns.unwrap_or(0))
    }

    /// Look up a field by dotted path (`heapSpace.committedSize`).
    pub fn field(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    fn required(&self, path: &str) -> Result<&JsonValue> {
        self.field(path).ok_or_else(|| {
            DaemonError::ConversionFailed(format!("{} has no field {}", self.event_type, path))
        })
    }

    fn mistyped(&self, path: &str, expected: &str) -> DaemonError {
        DaemonError::ConversionFailed(format!(
            "{}.{} is not {}",
            self.event_type, path, expected
        ))
    }

    pub fn f64_field(&self, path: &str) -> Result<f64> {
        self.required(path)?
            .as_f64()
            .ok_or_else(|| self.mistyped(path, "a number"))
    }

    pub fn i64_field(&self, path: &str) -> Result<i64> {
        self.required(path)?
            .as_i64()
            .ok_or_else(|| self.mistyped(path, "an integer"))
    }

    pub fn str_field(&self, path: &str) -> Result<&str> {
        self.required(path)?
            .as_str()
            .ok_or_else(|| self.mistyped(path, "a string"))
    }

    pub fn bool_field(&self, path: &str) -> Result<bool> {
        self.required(path)?
            .as_bool()
            .ok_or_else(|| self.mistyped(path, "a boolean"))
    }

    /// Name of the thread the event was emitted on, if recorded.
    ///
    /// Accepts either a plain string or an object with `javaName`.
    pub fn thread_name(&self) -> Option<&str> {
        match self.fields.get("eventThread")? {
            JsonValue::String(name) => Some(name),
            JsonValue::Object(thread) => thread.get("javaName").and_then(JsonValue::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event() -> RawEvent {
        RawEvent::new("jdk.GCHeapSummary", Utc.timestamp_opt(10, 0).unwrap())
            .with_field("heapUsed", 1024)
            .with_field("heapSpace", json!({"committedSize": 4096, "reservedSize": 8192}))
            .with_field("eventThread", json!({"javaName": "main"}))
    }

    #[test]
    fn test_dotted_field_lookup() {
        let event = event();
        assert_eq!(event.i64_field("heapSpace.committedSize").unwrap(), 4096);
        assert_eq!(event.f64_field("heapUsed").unwrap(), 1024.0);
        assert!(event.field("heapSpace.missing").is_none());
    }

    #[test]
    fn test_missing_field_is_conversion_fault() {
        let err = event().f64_field("nope").unwrap_err();
        assert!(matches!(err, DaemonError::ConversionFailed(_)));
    }

    #[test]
    fn test_mistyped_field() {
        assert!(event().str_field("heapUsed").is_err());
    }

    #[test]
    fn test_thread_name_forms() {
        assert_eq!(event().thread_name(), Some("main"));
        let plain = RawEvent::new("x", Utc.timestamp_opt(0, 0).unwrap()).with_field("eventThread", "worker-1");
        assert_eq!(plain.thread_name(), Some("worker-1"));
    }

    #[test]
    fn test_deserialize_minimal() {
        let event: RawEvent =
            serde_json::from_str(r#"{"type":"jdk.CPULoad","start_time":"1970-01-01T00:00:10Z"}"#).unwrap();
        assert_eq!(event.event_type, "jdk.CPULoad");
        assert_eq!(event.start_time.timestamp(), 10);
        assert!(event.fields.is_empty());
        assert_eq!(event.duration(), Duration::ZERO);
    }
}
