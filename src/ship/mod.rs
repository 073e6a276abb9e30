// src/ship/mod.rs
//! Harvest-to-ship pipeline
//!
//! - **Uploader**: decode, dedup and convert one snapshot, flush when due
//! - **Consumer**: the single converting thread of queued delivery
//! - **Sender**: the backend transport
//! - **Worker pool**: runs uploads off the controller task

pub mod compressor;
pub mod consumer;
pub mod sender;
pub mod uploader;
pub mod worker_pool;

pub use compressor::PayloadCompressor;
pub use consumer::QueuedConsumer;
pub use sender::{HttpSender, LogSender, TelemetrySender};
pub use uploader::{ConversionState, Delivery, Uploader};
pub use worker_pool::{HarvestWorkerPool, PoolStats};
