// src/harvest/watermark.rs
//! Cross-snapshot deduplication
//!
//! Successive snapshots overlap because the recording retains a little more
//! than one harvest interval. The filter remembers the start time of the last
//! event of the previous snapshot and forwards only events that started
//! strictly after it.
//!
//! Two distinct events sharing the exact watermark timestamp across a
//! snapshot boundary lose the second one. That approximation is kept.

use crate::harvest::event::RawEvent;
use crate::observability::{EVENTS_DROPPED_TOTAL, EVENTS_FORWARDED_TOTAL};
use crate::utils::errors::Result;
use crate::utils::time::epoch;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Outcome of filtering one snapshot
#[derive(Debug, Default)]
pub struct FilteredSnapshot {
    /// Events newer than the watermark, in snapshot order
    pub accepted: Vec<RawEvent>,

    /// Start time of the first event read
    pub first_event_time: Option<DateTime<Utc>>,

    /// Start time of the last event read
    pub last_event_time: Option<DateTime<Utc>>,

    /// Events at or before the watermark
    pub dropped: usize,
}

impl FilteredSnapshot {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.dropped
    }
}

/// Tracks the newest event time already forwarded
#[derive(Debug)]
pub struct EventWatermarkFilter {
    watermark: DateTime<Utc>,
}

impl Default for EventWatermarkFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventWatermarkFilter {
    /// Filter starting at the UNIX epoch
    pub fn new() -> Self {
        Self::starting_at(epoch())
    }

    pub fn starting_at(watermark: DateTime<Utc>) -> Self {
        Self { watermark }
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Consume a snapshot and return the events not seen before.
    ///
    /// The watermark only moves once the whole snapshot was read. A read
    /// error returns early, forwards nothing and leaves the watermark alone.
    pub fn filter_snapshot<I>(&mut self, events: I) -> Result<FilteredSnapshot>
    where
        I: IntoIterator<Item = Result<RawEvent>>,
    {
        let snapshot = self.scan(events)?;
        self.advance(&snapshot);
        metrics::counter!(EVENTS_FORWARDED_TOTAL).increment(snapshot.accepted.len() as u64);
        Ok(snapshot)
    }

    /// Like [`filter_snapshot`](Self::filter_snapshot) but leaves the
    /// watermark where it is. Call [`advance`](Self::advance) once the
    /// accepted events were handed on.
    pub fn scan<I>(&self, events: I) -> Result<FilteredSnapshot>
    where
        I: IntoIterator<Item = Result<RawEvent>>,
    {
        let mut snapshot = FilteredSnapshot::default();

        for event in events {
            let event = event?;

            snapshot.first_event_time.get_or_insert(event.start_time);
            snapshot.last_event_time = Some(event.start_time);

            if event.start_time > self.watermark {
                snapshot.accepted.push(event);
            } else {
                snapshot.dropped += 1;
            }
        }

        debug!(
            "Snapshot events from {:?} to {:?} [watermark {}]: {} accepted, {} dropped",
            snapshot.first_event_time,
            snapshot.last_event_time,
            self.watermark,
            snapshot.accepted.len(),
            snapshot.dropped
        );

        Ok(snapshot)
    }

    /// Move the watermark past a scanned snapshot. Only reads the event
    /// times and drop count, so `accepted` may already have been taken.
    pub fn advance(&mut self, snapshot: &FilteredSnapshot) {
        if let Some(last) = snapshot.last_event_time {
            self.watermark = self.watermark.max(last);
        }

        metrics::counter!(EVENTS_DROPPED_TOTAL).increment(snapshot.dropped as u64);
    }
}
