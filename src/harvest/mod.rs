// src/harvest/mod.rs
//! Snapshot reading and deduplication
//!
//! ```text
//! snapshot file ──► SnapshotDecoder ──► EventWatermarkFilter ──► accepted RawEvents
//!                                                                   │
//!                                       direct conversion ◄─────────┤
//!                                       RawEventQueue ◄─────────────┘ (queued mode)
//! ```

pub mod decoder;
pub mod event;
pub mod queue;
pub mod watermark;

pub use decoder::{JsonLinesDecoder, RawEventReader, SnapshotDecoder};
pub use event::RawEvent;
pub use queue::{raw_event_queue, RawEventReceiver, RawEventSender};
pub use watermark::{EventWatermarkFilter, FilteredSnapshot};
