// src/ship/compressor.rs
//! zstd payload compression for outgoing batches

use crate::utils::config::PayloadCompression;
use crate::utils::errors::{DaemonError, Result};
use tracing::debug;

/// zstd level used for telemetry payloads
const ZSTD_LEVEL: i32 = 3;

/// Compresses serialized batches before they go on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCompressor {
    mode: PayloadCompression,
}

impl PayloadCompressor {
    pub fn new(mode: PayloadCompression) -> Self {
        Self { mode }
    }

    /// `Content-Encoding` value for compressed payloads, if any
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self.mode {
            PayloadCompression::None => None,
            PayloadCompression::Zstd => Some("zstd"),
        }
    }

    pub fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if self.mode == PayloadCompression::None {
            return Ok(data);
        }

        let compressed = zstd::encode_all(data.as_slice(), ZSTD_LEVEL)
            .map_err(|e| DaemonError::CompressionFailed(format!("Compression error: {}", e)))?;

        debug!(
            "Compressed payload {} bytes -> {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            data.len() as f64 / compressed.len().max(1) as f64
        );
        Ok(compressed)
    }

    #[cfg(test)]
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if self.mode == PayloadCompression::None {
            return Ok(data.to_vec());
        }
        zstd::decode_all(data)
            .map_err(|e| DaemonError::CompressionFailed(format!("Decompression error: {}", e)))
    }
}

impl Default for PayloadCompressor {
    fn default() -> Self {
        Self::new(PayloadCompression::default())
    }
}
