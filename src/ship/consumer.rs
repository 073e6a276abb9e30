// src/ship/consumer.rs
//! Queued-mode consumer
//!
//! A single dedicated thread drains the raw event queue, converts each event
//! and flushes when the scheduler says so. Polling uses a short timeout so
//! the thread notices its stop handle promptly even when no events arrive.
//!
//! The stop handle must not be the controller's shutdown flag: harvests still
//! in flight after a shutdown signal keep pushing until the worker pool has
//! drained, so the consumer is only stopped after that.

use crate::harvest::queue::{Poll, RawEventReceiver};
use crate::recording::controller::ShutdownHandle;
use crate::ship::sender::TelemetrySender;
use crate::ship::uploader::{ship_buffer, ConversionState};
use crate::utils::errors::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

pub struct QueuedConsumer {
    receiver: RawEventReceiver,
    state: ConversionState,
    sender: Arc<dyn TelemetrySender>,
    poll_timeout: Duration,
    stop: ShutdownHandle,
}

impl QueuedConsumer {
    pub fn new(
        receiver: RawEventReceiver,
        state: ConversionState,
        sender: Arc<dyn TelemetrySender>,
        poll_timeout: Duration,
        stop: ShutdownHandle,
    ) -> Self {
        Self {
            receiver,
            state,
            sender,
            poll_timeout,
            stop,
        }
    }

    /// Start the consumer thread. Sends are driven on `runtime`.
    pub fn spawn(self, runtime: Handle) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("harvest-consumer".to_string())
            .spawn(move || self.run(runtime))?;
        Ok(handle)
    }

    fn run(mut self, runtime: Handle) {
        info!("Queued consumer started");

        loop {
            if self.stop.is_shutdown() {
                debug!("Queued consumer asked to stop");
                break;
            }

            match self.receiver.poll(self.poll_timeout) {
                Poll::Event(event) => self.state.convert(&event),
                Poll::Empty => {}
                Poll::Disconnected => {
                    debug!("Raw event queue disconnected");
                    break;
                }
            }

            if let Some(buffer) = self.state.take_if_ready() {
                runtime.block_on(ship_buffer(self.sender.as_ref(), buffer));
                self.state.mark_sent();
            }
        }

        // Whatever is still queued goes out with a final flush.
        for event in self.receiver.drain() {
            self.state.convert(&event);
        }
        if self.state.buffered() > 0 {
            let buffer = self.state.take_now();
            runtime.block_on(ship_buffer(self.sender.as_ref(), buffer));
            self.state.mark_sent();
        }

        let stats = self.receiver.stats();
        info!("Queued consumer stopped ({} events consumed)", stats.pop_count);
    }
}
