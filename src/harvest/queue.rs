// src/harvest/queue.rs
//! Bounded raw event queue for queued delivery
//!
//! Harvest workers push accepted events; a single consumer drains them.
//! Pushing blocks while the queue is full, so a slow consumer slows the
//! harvest down instead of losing events.

use crate::harvest::event::RawEvent;
use crate::utils::errors::{DaemonError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 250_000;

#[derive(Debug, Default)]
struct Counters {
    push_count: AtomicU64,
    pop_count: AtomicU64,
}

/// Create a queue, returning its producer and consumer halves.
pub fn raw_event_queue(capacity: usize) -> (RawEventSender, RawEventReceiver) {
    let (tx, rx) = bounded(capacity);
    let counters = Arc::new(Counters::default());
    (
        RawEventSender {
            tx,
            counters: Arc::clone(&counters),
        },
        RawEventReceiver { rx, counters },
    )
}

/// Producer half; cheap to clone
#[derive(Debug, Clone)]
pub struct RawEventSender {
    tx: Sender<RawEvent>,
    counters: Arc<Counters>,
}

impl RawEventSender {
    /// Push one event, blocking while the queue is full.
    pub fn push(&self, event: RawEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| DaemonError::QueueClosed)?;
        self.counters.push_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Push every event in order.
    pub fn push_all(&self, events: impl IntoIterator<Item = RawEvent>) -> Result<usize> {
        let mut pushed = 0;
        for event in events {
            self.push(event)?;
            pushed += 1;
        }
        Ok(pushed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::read(&self.counters, self.tx.len(), self.tx.capacity())
    }
}

/// Result of one poll
#[derive(Debug)]
pub enum Poll {
    Event(RawEvent),
    /// Nothing arrived within the timeout
    Empty,
    /// Every producer is gone
    Disconnected,
}

/// Consumer half
#[derive(Debug)]
pub struct RawEventReceiver {
    rx: Receiver<RawEvent>,
    counters: Arc<Counters>,
}

impl RawEventReceiver {
    /// Wait up to `timeout` for the next event.
    pub fn poll(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.counters.pop_count.fetch_add(1, Ordering::Relaxed);
                Poll::Event(event)
            }
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Disconnected,
        }
    }

    /// Take whatever is queued right now without waiting.
    pub fn drain(&self) -> Vec<RawEvent> {
        let events: Vec<_> = self.rx.try_iter().collect();
        self.counters
            .pop_count
            .fetch_add(events.len() as u64, Ordering::Relaxed);
        events
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::read(&self.counters, self.rx.len(), self.rx.capacity())
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Total events pushed
    pub push_count: u64,

    /// Total events taken by the consumer
    pub pop_count: u64,

    /// Events currently queued
    pub current_size: usize,

    pub capacity: usize,
}

impl QueueStats {
    fn read(counters: &Counters, current_size: usize, capacity: Option<usize>) -> Self {
        Self {
            push_count: counters.push_count.load(Ordering::Relaxed),
            pop_count: counters.pop_count.load(Ordering::Relaxed),
            current_size,
            capacity: capacity.unwrap_or(0),
        }
    }

    /// Fill level in percent
    pub fn fill_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::epoch;
    use std::thread;

    fn event(name: &str) -> RawEvent {
        RawEvent::new(name, epoch())
    }

    #[test]
    fn test_push_poll() {
        let (tx, rx) = raw_event_queue(10);
        tx.push(event("a")).unwrap();

        match rx.poll(Duration::from_millis(10)) {
            Poll::Event(e) => assert_eq!(e.event_type, "a"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Empty));

        let stats = rx.stats();
        assert_eq!(stats.push_count, 1);
        assert_eq!(stats.pop_count, 1);
        assert_eq!(stats.capacity, 10);
    }

    #[test]
    fn test_disconnect_after_producers_drop() {
        let (tx, rx) = raw_event_queue(4);
        tx.push(event("last")).unwrap();
        drop(tx);

        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Event(_)));
        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Disconnected));
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let (tx, rx) = raw_event_queue(2);
        let producer = thread::spawn(move || tx.push_all((0..5).map(|i| event(&i.to_string()))));

        let mut seen = Vec::new();
        while seen.len() < 5 {
            if let Poll::Event(e) = rx.poll(Duration::from_secs(1)) {
                seen.push(e.event_type);
            }
        }

        assert_eq!(producer.join().unwrap().unwrap(), 5);
        assert_eq!(seen, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_push_to_closed_queue_fails() {
        let (tx, rx) = raw_event_queue(2);
        drop(rx);
        assert!(tx.push(event("a")).is_err());
    }
}
