// src/convert/builtin.rs
//! Default mapper set
//!
//! | Event type                        | Capability | Output                              |
//! |-----------------------------------|------------|-------------------------------------|
//! | `jdk.CPULoad`                     | metric     | `jfr.CPULoad.{jvmUser,jvmSystem,machineTotal}` |
//! | `jdk.GCHeapSummary`               | metric     | `jfr.GCHeapSummary.{heapUsed,heapCommittedSize,heapReservedSize}` |
//! | `jdk.Compilation`                 | event      | `JfrCompilation`                    |
//! | `jdk.JavaMonitorWait` (> 20 ms)   | event      | `JfrJavaMonitorWait`                |
//! | `jdk.GCPhasePause`                | summary    | `jfr.GCPhasePause.duration`         |
//! | `jdk.ObjectAllocationInNewTLAB`   | summary    | `jfr.ObjectAllocationInNewTLAB.allocation` |
//! | `jdk.SocketRead` / `jdk.SocketWrite` | summary | `jfr.SocketRead.bytesRead` / `jfr.SocketWrite.bytesWritten` |

use crate::convert::mapper::{EventMapper, MapperRegistry, MetricMapper};
use crate::convert::summary::{DurationSummarizer, LongSummarizer};
use crate::harvest::event::RawEvent;
use crate::telemetry::attributes::Attributes;
use crate::telemetry::record::{Metric, TelemetryEvent};
use crate::utils::errors::Result;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub const THREAD_NAME: &str = "thread.name";

/// Monitor waits at or below this are not reported
pub const MONITOR_WAIT_THRESHOLD: Duration = Duration::from_millis(20);

impl MapperRegistry {
    /// Registry with every built-in capability
    pub fn default_registry() -> Self {
        MapperRegistry::builder()
            .metric(FieldGaugeMapper::new(
                "jdk.CPULoad",
                &[
                    ("jvmUser", "jfr.CPULoad.jvmUser"),
                    ("jvmSystem", "jfr.CPULoad.jvmSystem"),
                    ("machineTotal", "jfr.CPULoad.machineTotal"),
                ],
            ))
            .metric(
                FieldGaugeMapper::new(
                    "jdk.GCHeapSummary",
                    &[
                        ("heapUsed", "jfr.GCHeapSummary.heapUsed"),
                        ("heapSpace.committedSize", "jfr.GCHeapSummary.heapCommittedSize"),
                        ("heapSpace.reservedSize", "jfr.GCHeapSummary.heapReservedSize"),
                    ],
                )
                .with_attribute("when", "when"),
            )
            .event(CompilationMapper)
            .event(MonitorWaitMapper::new(MONITOR_WAIT_THRESHOLD))
            .summarizer(DurationSummarizer::new("jdk.GCPhasePause", "jfr.GCPhasePause.duration"))
            .summarizer(LongSummarizer::new(
                "jdk.ObjectAllocationInNewTLAB",
                "tlabSize",
                "jfr.ObjectAllocationInNewTLAB.allocation",
            ))
            .summarizer(LongSummarizer::new("jdk.SocketRead", "bytesRead", "jfr.SocketRead.bytesRead"))
            .summarizer(LongSummarizer::new(
                "jdk.SocketWrite",
                "bytesWritten",
                "jfr.SocketWrite.bytesWritten",
            ))
            .build()
    }
}

/// Emits one gauge per configured numeric field
#[derive(Debug, Clone)]
pub struct FieldGaugeMapper {
    event_type: String,
    gauges: Vec<(String, String)>,
    attributes: Vec<(String, String)>,
}

impl FieldGaugeMapper {
    /// `gauges` pairs a field path with the metric name it feeds.
    pub fn new(event_type: &str, gauges: &[(&str, &str)]) -> Self {
        Self {
            event_type: event_type.to_string(),
            gauges: gauges
                .iter()
                .map(|(field, name)| (field.to_string(), name.to_string()))
                .collect(),
            attributes: Vec::new(),
        }
    }

    /// Copy an optional string field onto every gauge as an attribute.
    pub fn with_attribute(mut self, field: &str, attribute: &str) -> Self {
        self.attributes.push((field.to_string(), attribute.to_string()));
        self
    }
}

impl MetricMapper for FieldGaugeMapper {
    fn test(&self, event: &RawEvent) -> bool {
        event.event_type == self.event_type
    }

    fn apply(&self, event: &RawEvent) -> Result<Vec<Metric>> {
        let mut attributes = Attributes::new();
        for (field, attribute) in &self.attributes {
            if let Some(JsonValue::String(value)) = event.field(field) {
                attributes.put(attribute.as_str(), value.as_str());
            }
        }

        self.gauges
            .iter()
            .map(|(field, name)| {
                Ok(Metric::gauge(
                    name.as_str(),
                    event.f64_field(field)?,
                    event.start_time,
                    attributes.clone(),
                ))
            })
            .collect()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn thread_attributes(event: &RawEvent) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(thread) = event.thread_name() {
        attributes.put(THREAD_NAME, thread);
    }
    attributes
}

/// JIT compilations as `JfrCompilation` events
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilationMapper;

impl EventMapper for CompilationMapper {
    fn test(&self, event: &RawEvent) -> bool {
        event.event_type == "jdk.Compilation"
    }

    fn apply(&self, event: &RawEvent) -> Result<Vec<TelemetryEvent>> {
        let mut attributes = thread_attributes(event);
        attributes
            .put("desc", event.str_field("method")?)
            .put("duration", millis(event.duration()))
            .put("succeeded", event.bool_field("succeeded")?);

        Ok(vec![TelemetryEvent::new("JfrCompilation", event.start_time, attributes)])
    }
}

/// Long monitor waits as `JfrJavaMonitorWait` events
#[derive(Debug, Clone, Copy)]
pub struct MonitorWaitMapper {
    threshold: Duration,
}

impl MonitorWaitMapper {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl EventMapper for MonitorWaitMapper {
    fn test(&self, event: &RawEvent) -> bool {
        event.event_type == "jdk.JavaMonitorWait"
    }

    fn apply(&self, event: &RawEvent) -> Result<Vec<TelemetryEvent>> {
        let duration = event.duration();
        if duration <= self.threshold {
            return Ok(Vec::new());
        }

        let mut attributes = thread_attributes(event);
        attributes
            .put("class", event.str_field("monitorClass.name")?)
            .put("duration", millis(duration));

        Ok(vec![TelemetryEvent::new("JfrJavaMonitorWait", event.start_time, attributes)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::epoch;
    use serde_json::json;

    #[test]
    fn test_default_registry_contents() {
        let registry = MapperRegistry::default_registry();
        assert_eq!(registry.metric_mappers.len(), 2);
        assert_eq!(registry.event_mappers.len(), 2);
        assert_eq!(registry.summarizers.len(), 4);
    }

    #[test]
    fn test_cpu_load_gauges() {
        let registry = MapperRegistry::default_registry();
        let event = RawEvent::new("jdk.CPULoad", epoch())
            .with_field("jvmUser", 0.25)
            .with_field("jvmSystem", 0.05)
            .with_field("machineTotal", 0.75);

        let mapper = registry.metric_mappers.iter().find(|m| m.test(&event)).unwrap();
        let metrics = mapper.apply(&event).unwrap();

        let names: Vec<_> = metrics.iter().map(Metric::name).collect();
        assert_eq!(names, vec!["jfr.CPULoad.jvmUser", "jfr.CPULoad.jvmSystem", "jfr.CPULoad.machineTotal"]);
    }

    #[test]
    fn test_heap_summary_carries_when() {
        let mapper = FieldGaugeMapper::new("jdk.GCHeapSummary", &[("heapUsed", "jfr.GCHeapSummary.heapUsed")])
            .with_attribute("when", "when");
        let event = RawEvent::new("jdk.GCHeapSummary", epoch())
            .with_field("heapUsed", 1024)
            .with_field("when", "After GC");

        let metrics = mapper.apply(&event).unwrap();
        assert_eq!(metrics[0].attributes().get_str("when"), Some("After GC"));
    }

    #[test]
    fn test_compilation_event() {
        let event = RawEvent::new("jdk.Compilation", epoch())
            .with_duration(Duration::from_millis(12))
            .with_field("method", "java.lang.String.hashCode()I")
            .with_field("succeeded", true)
            .with_field("eventThread", json!({"javaName": "C2 CompilerThread0"}));

        let events = CompilationMapper.apply(&event).unwrap();
        let attrs = &events[0].attributes;

        assert_eq!(events[0].event_type, "JfrCompilation");
        assert_eq!(attrs.get_str("desc"), Some("java.lang.String.hashCode()I"));
        assert_eq!(attrs.get_str(THREAD_NAME), Some("C2 CompilerThread0"));
        assert_eq!(attrs.get("duration"), Some(&json!(12.0)));
    }

    #[test]
    fn test_short_monitor_wait_is_ignored() {
        let mapper = MonitorWaitMapper::new(MONITOR_WAIT_THRESHOLD);
        let short = RawEvent::new("jdk.JavaMonitorWait", epoch()).with_duration(Duration::from_millis(20));
        assert!(mapper.apply(&short).unwrap().is_empty());

        let long = RawEvent::new("jdk.JavaMonitorWait", epoch())
            .with_duration(Duration::from_millis(21))
            .with_field("monitorClass", json!({"name": "java.lang.Object"}));
        let events = mapper.apply(&long).unwrap();
        assert_eq!(events[0].attributes.get_str("class"), Some("java.lang.Object"));
    }
}
