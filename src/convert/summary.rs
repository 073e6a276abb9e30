// src/convert/summary.rs
//! Windowed summarizers
//!
//! Both summarizers keep count/sum/min/max for one event type and reset after
//! every `summarize`. An empty window still emits a summary with count 0.

use crate::convert::mapper::Summarizer;
use crate::harvest::event::RawEvent;
use crate::telemetry::attributes::Attributes;
use crate::telemetry::record::Metric;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Aggregate {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Aggregate {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn emit(&mut self, name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Metric {
        let agg = std::mem::take(self);
        Metric::Summary {
            name: name.to_string(),
            count: agg.count,
            sum: agg.sum,
            min: agg.min,
            max: agg.max,
            start,
            end,
            attributes: Attributes::new(),
        }
    }
}

/// Summarizes event durations in milliseconds
#[derive(Debug, Clone)]
pub struct DurationSummarizer {
    event_type: String,
    metric_name: String,
    current: Aggregate,
}

impl DurationSummarizer {
    pub fn new(event_type: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            metric_name: metric_name.into(),
            current: Aggregate::default(),
        }
    }
}

impl Summarizer for DurationSummarizer {
    fn test(&self, event: &RawEvent) -> bool {
        event.event_type == self.event_type
    }

    fn accept(&mut self, event: &RawEvent) -> Result<()> {
        self.current.add(event.duration().as_nanos() as f64 / 1_000_000.0);
        Ok(())
    }

    fn summarize(&mut self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<Metric> {
        vec![self.current.emit(&self.metric_name, window_start, window_end)]
    }
}

/// Summarizes an integer field
#[derive(Debug, Clone)]
pub struct LongSummarizer {
    event_type: String,
    field: String,
    metric_name: String,
    current: Aggregate,
}

impl LongSummarizer {
    pub fn new(event_type: impl Into<String>, field: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            field: field.into(),
            metric_name: metric_name.into(),
            current: Aggregate::default(),
        }
    }
}

impl Summarizer for LongSummarizer {
    fn test(&self, event: &RawEvent) -> bool {
        event.event_type == self.event_type
    }

    fn accept(&mut self, event: &RawEvent) -> Result<()> {
        let value = event.i64_field(&self.field)?;
        self.current.add(value as f64);
        Ok(())
    }

    fn summarize(&mut self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<Metric> {
        vec![self.current.emit(&self.metric_name, window_start, window_end)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::epoch;
    use std::time::Duration;

    fn summary_of(metric: &Metric) -> (u64, f64, f64, f64) {
        match metric {
            Metric::Summary { count, sum, min, max, .. } => (*count, *sum, *min, *max),
            other => panic!("not a summary: {:?}", other),
        }
    }

    #[test]
    fn test_duration_window_then_empty_window() {
        let mut summarizer = DurationSummarizer::new("jdk.GCPhasePause", "jfr.GCPhasePause.duration");
        for ms in [5, 1, 3] {
            let event = RawEvent::new("jdk.GCPhasePause", epoch()).with_duration(Duration::from_millis(ms));
            summarizer.accept(&event).unwrap();
        }

        let first = summarizer.summarize(epoch(), epoch());
        assert_eq!(summary_of(&first[0]), (3, 9.0, 1.0, 5.0));

        let second = summarizer.summarize(epoch(), epoch());
        assert_eq!(summary_of(&second[0]), (0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_long_summarizer_reads_field() {
        let mut summarizer = LongSummarizer::new("jdk.SocketRead", "bytesRead", "jfr.SocketRead.bytesRead");
        let event = RawEvent::new("jdk.SocketRead", epoch()).with_field("bytesRead", 512);

        assert!(summarizer.test(&event));
        summarizer.accept(&event).unwrap();
        assert_eq!(summary_of(&summarizer.summarize(epoch(), epoch())[0]), (1, 512.0, 512.0, 512.0));
    }

    #[test]
    fn test_long_summarizer_missing_field() {
        let mut summarizer = LongSummarizer::new("jdk.SocketRead", "bytesRead", "jfr.SocketRead.bytesRead");
        let event = RawEvent::new("jdk.SocketRead", epoch());
        assert!(summarizer.accept(&event).is_err());
    }
}
