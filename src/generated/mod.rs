// src/generated/mod.rs
//! Protobuf types and gRPC client for `proto/management.proto`.
//!
//! Checked in so builds do not need `protoc`; regenerate with `tonic-build`
//! (client only) after editing the proto.

#[rustfmt::skip]
pub mod management;
