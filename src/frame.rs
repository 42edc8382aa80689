//! Canonical telemetry frame shared by the decoders and the reassembler
//!
//! Every capture format is normalized into a sequence of [`Frame`] values:
//! a timestamp plus the raw bytes of one telemetry record.
//!
//! # Record layout
//!
//! ```text
//! | header (8 bytes)                    | body (56 bytes)            |
//! | stream marker .. | offset (LE) | .. | JPEG chunk placed at offset |
//! ```
//!
//! The position of the marker and of the little-endian offset field inside
//! the header is satellite specific and lives in
//! [`ReassemblyConfig`](crate::config::ReassemblyConfig).

use chrono::NaiveDateTime;

/// Length of one telemetry record in bytes
pub const FRAME_LEN: usize = 64;

/// Length of the record header carrying stream marker and byte offset
pub const HEADER_LEN: usize = 8;

/// JPEG start-of-image sequence (SOI followed by the first marker prefix)
pub const JPEG_START: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// JPEG end-of-image marker (EOI)
pub const JPEG_END: [u8; 2] = [0xFF, 0xD9];

/// Timestamp format used by delimited exports
pub const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed timestamp for formats that carry no per-record time.
///
/// All records share it, so sorting by time keeps arrival order.
pub fn synthetic_epoch() -> NaiveDateTime {
    // NaiveDateTime defaults to 1970-01-01 00:00:00
    NaiveDateTime::default()
}

/// One telemetry record with the time it was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    timestamp: NaiveDateTime,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from a timestamp and the raw record bytes
    pub fn new(timestamp: NaiveDateTime, payload: Vec<u8>) -> Self {
        Self { timestamp, payload }
    }

    /// Time the record was received
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Raw record bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Record header, or `None` if the record is shorter than [`HEADER_LEN`]
    pub fn header(&self) -> Option<&[u8]> {
        self.payload.get(..HEADER_LEN)
    }

    /// Record body following the header (empty for short records)
    pub fn body(&self) -> &[u8] {
        self.payload.get(HEADER_LEN..).unwrap_or(&[])
    }

    /// Upper-case hex rendering of the record, as it appears on the wire
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.payload)
    }
}
