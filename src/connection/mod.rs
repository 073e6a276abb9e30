// src/connection/mod.rs
//! Remote management connection
//!
//! - **backoff**: exponential retry schedules
//! - **supervisor**: retry loop and connection acquisition
//! - **management**: transport trait plus typed recorder/metadata facades
//! - **grpc**: tonic transport

pub mod backoff;
pub mod grpc;
pub mod management;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod fake;

pub use backoff::{Backoff, BackoffPolicy};
pub use management::{Connector, FlightRecorder, LinkingMetadata, ManagementConnection, Value};
pub use supervisor::{ConnectionSupervisor, RetryContext};
