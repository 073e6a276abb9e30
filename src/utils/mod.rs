// src/utils/mod.rs
//! Shared building blocks: configuration, errors and injectable time.

pub mod config;
pub mod errors;
pub mod time;

pub use config::DaemonConfig;
pub use errors::{DaemonError, Result};
pub use time::{Clock, Sleeper, SystemClock, TokioSleeper};
