// src/convert/dispatcher.rs
//! Routes raw events through the mapper registry
//!
//! For each event: metric mappers, then event mappers, then summarizers.
//! A failing capability drops the rest of that event (its own category and
//! every later one); records already appended for it stay in the buffer.
//! A panicking capability is treated like a failing one, so a bad mapper
//! cannot take the conversion thread down.

use crate::convert::mapper::MapperRegistry;
use crate::harvest::event::RawEvent;
use crate::observability::CONVERSION_ERRORS_TOTAL;
use crate::telemetry::buffer::TelemetryBuffer;
use crate::utils::errors::{DaemonError, Result};
use crate::utils::time::Clock;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ConversionDispatcher {
    registry: MapperRegistry,
    clock: Arc<dyn Clock>,
    window_start: DateTime<Utc>,
    /// Events seen per type since the last cycle
    tally: BTreeMap<String, u64>,
}

impl ConversionDispatcher {
    pub fn new(registry: MapperRegistry, clock: Arc<dyn Clock>) -> Self {
        let window_start = clock.now();
        Self {
            registry,
            clock,
            window_start,
            tally: BTreeMap::new(),
        }
    }

    /// Convert one event into `buffer`. Mapper faults are logged, not returned.
    pub fn process(&mut self, event: &RawEvent, buffer: &mut TelemetryBuffer) {
        *self.tally.entry(event.event_type.clone()).or_insert(0) += 1;

        let converted = catch_unwind(AssertUnwindSafe(|| self.convert(event, buffer)))
            .unwrap_or_else(|panic| Err(panicked(panic)));
        if let Err(e) = converted {
            metrics::counter!(CONVERSION_ERRORS_TOTAL).increment(1);
            warn!(
                "Dropping event {} {} due to error: {}",
                event.event_type,
                event.description_or_empty(),
                e
            );
        }
    }

    fn convert(&mut self, event: &RawEvent, buffer: &mut TelemetryBuffer) -> Result<()> {
        for mapper in self.registry.metric_mappers.iter().filter(|m| m.test(event)) {
            for metric in mapper.apply(event)? {
                buffer.add_metric(metric);
            }
        }

        for mapper in self.registry.event_mappers.iter().filter(|m| m.test(event)) {
            for converted in mapper.apply(event)? {
                buffer.add_event(converted);
            }
        }

        for summarizer in self.registry.summarizers.iter_mut() {
            if summarizer.test(event) {
                summarizer.accept(event)?;
            }
        }

        Ok(())
    }

    /// Close the summary window: every summarizer emits and resets.
    pub fn finish_cycle(&mut self, buffer: &mut TelemetryBuffer) {
        let window_end = self.clock.now();

        let window_start = self.window_start;
        for summarizer in self.registry.summarizers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| summarizer.summarize(window_start, window_end))) {
                Ok(summary) => {
                    for metric in summary {
                        buffer.add_metric(metric);
                    }
                }
                Err(panic) => {
                    metrics::counter!(CONVERSION_ERRORS_TOTAL).increment(1);
                    warn!("Dropping summary window: {}", panicked(panic));
                }
            }
        }
        self.window_start = window_end;

        if !self.tally.is_empty() {
            debug!("Events converted this cycle: {:?}", self.tally);
        }
        self.tally.clear();
    }

    pub fn tally(&self) -> &BTreeMap<String, u64> {
        &self.tally
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> DaemonError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DaemonError::ConversionFailed(format!("mapper panicked: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::mapper::{EventMapper, MetricMapper};
    use crate::convert::summary::DurationSummarizer;
    use crate::telemetry::attributes::{Attributes, CommonAttributes};
    use crate::telemetry::record::{Metric, TelemetryEvent};
    use crate::utils::errors::DaemonError;
    use crate::utils::time::{epoch, ManualClock};
    use std::time::Duration;

    struct ConstGauge(&'static str);

    impl MetricMapper for ConstGauge {
        fn test(&self, event: &RawEvent) -> bool {
            event.event_type == "t"
        }
        fn apply(&self, event: &RawEvent) -> Result<Vec<Metric>> {
            Ok(vec![Metric::gauge(self.0, 1.0, event.start_time, Attributes::new())])
        }
    }

    struct Failing;

    impl MetricMapper for Failing {
        fn test(&self, _: &RawEvent) -> bool {
            true
        }
        fn apply(&self, _: &RawEvent) -> Result<Vec<Metric>> {
            Err(DaemonError::ConversionFailed("boom".into()))
        }
    }

    struct Panicking;

    impl EventMapper for Panicking {
        fn test(&self, _: &RawEvent) -> bool {
            true
        }
        fn apply(&self, _: &RawEvent) -> Result<Vec<TelemetryEvent>> {
            panic!("unexpected field layout")
        }
    }

    struct Echo;

    impl EventMapper for Echo {
        fn test(&self, _: &RawEvent) -> bool {
            true
        }
        fn apply(&self, event: &RawEvent) -> Result<Vec<TelemetryEvent>> {
            Ok(vec![TelemetryEvent::new("Echo", event.start_time, Attributes::new())])
        }
    }

    fn buffer() -> TelemetryBuffer {
        TelemetryBuffer::new(Arc::new(CommonAttributes::default()))
    }

    #[test]
    fn test_all_categories_contribute() {
        let registry = MapperRegistry::builder()
            .metric(ConstGauge("a"))
            .event(Echo)
            .summarizer(DurationSummarizer::new("t", "t.duration"))
            .build();
        let mut dispatcher = ConversionDispatcher::new(registry, Arc::new(ManualClock::new(epoch())));
        let mut buffer = buffer();

        dispatcher.process(&RawEvent::new("t", epoch()), &mut buffer);

        assert_eq!(buffer.metrics().len(), 1);
        assert_eq!(buffer.events().len(), 1);
        assert_eq!(dispatcher.tally().get("t"), Some(&1));
    }

    #[test]
    fn test_failing_mapper_isolated() {
        let registry = MapperRegistry::builder()
            .metric(ConstGauge("before"))
            .metric(Failing)
            .metric(ConstGauge("after"))
            .event(Echo)
            .build();
        let mut dispatcher = ConversionDispatcher::new(registry, Arc::new(ManualClock::new(epoch())));
        let mut buffer = buffer();

        dispatcher.process(&RawEvent::new("t", epoch()), &mut buffer);

        let names: Vec<_> = buffer.metrics().iter().map(Metric::name).collect();
        assert_eq!(names, vec!["before"]);
        assert!(buffer.events().is_empty());

        dispatcher.process(&RawEvent::new("other", epoch()), &mut buffer);
        assert_eq!(dispatcher.tally().len(), 2);
    }

    #[test]
    fn test_panicking_mapper_isolated() {
        let registry = MapperRegistry::builder()
            .metric(ConstGauge("kept"))
            .event(Panicking)
            .summarizer(DurationSummarizer::new("t", "t.duration"))
            .build();
        let mut dispatcher = ConversionDispatcher::new(registry, Arc::new(ManualClock::new(epoch())));
        let mut buffer = buffer();

        dispatcher.process(&RawEvent::new("t", epoch()), &mut buffer);
        dispatcher.process(&RawEvent::new("t", epoch()), &mut buffer);

        let names: Vec<_> = buffer.metrics().iter().map(Metric::name).collect();
        assert_eq!(names, vec!["kept", "kept"]);
        assert!(buffer.events().is_empty());

        // Summaries never saw the events.
        dispatcher.finish_cycle(&mut buffer);
        match buffer.metrics().last() {
            Some(Metric::Summary { count, .. }) => assert_eq!(*count, 0),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_summary_windows() {
        let clock = ManualClock::new(epoch());
        let registry = MapperRegistry::builder()
            .summarizer(DurationSummarizer::new("t", "t.duration"))
            .build();
        let mut dispatcher = ConversionDispatcher::new(registry, Arc::new(clock.clone()));
        let mut buffer = buffer();

        for _ in 0..3 {
            let event = RawEvent::new("t", epoch()).with_duration(Duration::from_millis(2));
            dispatcher.process(&event, &mut buffer);
        }
        clock.advance(Duration::from_secs(10));
        dispatcher.finish_cycle(&mut buffer);

        clock.advance(Duration::from_secs(10));
        dispatcher.finish_cycle(&mut buffer);

        let windows: Vec<_> = buffer
            .metrics()
            .iter()
            .map(|m| match m {
                Metric::Summary { count, start, end, .. } => (*count, start.timestamp(), end.timestamp()),
                other => panic!("unexpected: {:?}", other),
            })
            .collect();
        assert_eq!(windows, vec![(3, 0, 10), (0, 10, 20)]);
        assert!(dispatcher.tally().is_empty());
    }
}
