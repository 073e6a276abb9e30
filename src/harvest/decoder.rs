// src/harvest/decoder.rs
//! Snapshot decoding
//!
//! A [`SnapshotDecoder`] turns a snapshot file into a sequential stream of
//! [`RawEvent`]s. The shipped [`JsonLinesDecoder`] reads one JSON event per
//! line; other recording formats plug in behind the same trait.

use crate::harvest::event::RawEvent;
use crate::utils::errors::{DaemonError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Sequential reader over a snapshot's events
pub type RawEventReader = Box<dyn Iterator<Item = Result<RawEvent>> + Send>;

/// Opens snapshot files for reading
pub trait SnapshotDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<RawEventReader>;
}

/// Newline-delimited JSON, one [`RawEvent`] per line. Blank lines are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl SnapshotDecoder for JsonLinesDecoder {
    fn open(&self, path: &Path) -> Result<RawEventReader> {
        let file = File::open(path).map_err(|e| {
            DaemonError::DecodeFailed(format!("Cannot open {}: {}", path.display(), e))
        })?;

        Ok(Box::new(JsonLines {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        }))
    }
}

struct JsonLines {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for JsonLines {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(DaemonError::DecodeFailed(format!(
                        "line {}: {}",
                        self.line_no, e
                    ))))
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|e| {
                DaemonError::DecodeFailed(format!("line {}: {}", self.line_no, e))
            }));
        }
    }
}
