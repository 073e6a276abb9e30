// src/recording/mod.rs
//! Remote recording lifecycle
//!
//! - **Session**: one started recording on the target, plus the factory that
//!   (re)creates it
//! - **Strategy**: how a snapshot of the running recording reaches local disk
//! - **Controller**: the periodic harvest loop and its recovery state machine

pub mod controller;
pub mod session;
pub mod strategy;

pub use controller::{ControllerState, RecordingController, ShutdownHandle, SnapshotHandler};
pub use session::{RecordingHandle, RecordingSession, RecordingSettings, SessionFactory};
pub use strategy::{CopyStrategy, SnapshotFile, SnapshotStrategy, StreamStrategy, DEFAULT_BLOCK_SIZE};
