//! Synthetic telemetry record generation for testing
//!
//! Splits a known JPEG into offset-tagged records and serializes them in any
//! of the supported capture formats, so reassembly results can be compared
//! byte-for-byte with the source image.
//!
//! # Example
//!
//! ```rust,ignore
//! use sat_imager_lib::test_utils::{fake_jpeg, kiss_encode, RecordGenerator};
//!
//! let image = fake_jpeg(500);
//! let records = RecordGenerator::geoscan().chunk_image(&image, 0x1000);
//!
//! std::fs::write("pass.kss", kiss_encode(&records))?;
//! ```

use chrono::{Duration, NaiveDateTime};

use crate::config::OffsetField;
use crate::frame::{
    synthetic_epoch, Frame, EXPORT_TIMESTAMP_FORMAT, FRAME_LEN, HEADER_LEN, JPEG_END, JPEG_START,
};
use crate::frame_decoder::{DATA_FRAME, FEND, FESC, TFEND, TFESC};
use crate::profiles::{GEOSCAN_IMAGE_MARKER, STRATOSAT_IMAGE_MARKER};

/// Record header builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Stream marker at the start of the header
    pub marker: Vec<u8>,
    /// Where the offset is written
    pub offset_field: OffsetField,
    /// Byte offset of the chunk
    pub offset: u64,
}

impl RecordHeader {
    /// Create a header for a chunk at `offset`
    pub fn new(marker: &[u8], offset_field: OffsetField, offset: u64) -> Self {
        Self {
            marker: marker.to_vec(),
            offset_field,
            offset,
        }
    }

    /// Serialize to [`HEADER_LEN`] bytes; unused bytes are zero
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[..self.marker.len()].copy_from_slice(&self.marker);

        let OffsetField { position, width } = self.offset_field;
        bytes[position..position + width].copy_from_slice(&self.offset.to_le_bytes()[..width]);

        bytes
    }
}

/// Generates offset-tagged records for one image stream
#[derive(Debug, Clone)]
pub struct RecordGenerator {
    /// Stream marker written into every header
    pub marker: Vec<u8>,
    /// Offset field layout
    pub offset_field: OffsetField,
    /// Image bytes carried per record
    pub body_len: usize,
    /// Pad the last record to [`FRAME_LEN`] with zeros
    pub pad_records: bool,
}

impl Default for RecordGenerator {
    fn default() -> Self {
        Self::geoscan()
    }
}

impl RecordGenerator {
    /// Create a generator producing full-size records
    pub fn new(marker: &[u8], offset_field: OffsetField) -> Self {
        Self {
            marker: marker.to_vec(),
            offset_field,
            body_len: FRAME_LEN - HEADER_LEN,
            pad_records: true,
        }
    }

    /// Records in the Geoscan-Edelveis layout
    pub fn geoscan() -> Self {
        Self::new(&GEOSCAN_IMAGE_MARKER, OffsetField::new(5, 2))
    }

    /// Records in the Stratosat-TK1 layout
    pub fn stratosat() -> Self {
        Self::new(&STRATOSAT_IMAGE_MARKER, OffsetField::new(5, 3))
    }

    /// Use a different body size; records are no longer padded
    pub fn with_body_len(mut self, body_len: usize) -> Self {
        self.body_len = body_len;
        self.pad_records = false;
        self
    }

    /// Build a single record carrying `body` at `offset`
    pub fn record(&self, offset: u64, body: &[u8]) -> Vec<u8> {
        let mut record = RecordHeader::new(&self.marker, self.offset_field, offset).to_bytes();
        record.extend_from_slice(body);
        if self.pad_records && record.len() < FRAME_LEN {
            record.resize(FRAME_LEN, 0);
        }
        record
    }

    /// Split an image into records, the first one tagged with `base_offset`
    pub fn chunk_image(&self, image: &[u8], base_offset: u64) -> Vec<Vec<u8>> {
        image
            .chunks(self.body_len.max(1))
            .enumerate()
            .map(|(i, chunk)| self.record(base_offset + (i * self.body_len) as u64, chunk))
            .collect()
    }
}

/// Build a JPEG-shaped byte string of `len` bytes (at least 6).
///
/// Starts with SOI and an APP0 marker and ends with EOI. The filler never
/// contains `0xFF`, so no other start or end sequence appears inside.
pub fn fake_jpeg(len: usize) -> Vec<u8> {
    let len = len.max(JPEG_START.len() + 1 + JPEG_END.len());
    let mut jpeg = JPEG_START.to_vec();
    jpeg.push(0xE0);

    let filler = len - jpeg.len() - JPEG_END.len();
    jpeg.extend((0..filler).map(|i| (i % 251) as u8));
    jpeg.extend_from_slice(&JPEG_END);

    jpeg
}

/// Wrap records into frames sharing the synthetic epoch
pub fn epoch_frames(records: &[Vec<u8>]) -> Vec<Frame> {
    records
        .iter()
        .map(|record| Frame::new(synthetic_epoch(), record.clone()))
        .collect()
}

/// Wrap records into frames one second apart, starting at `start`
pub fn timed_frames(records: &[Vec<u8>], start: NaiveDateTime) -> Vec<Frame> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| Frame::new(start + Duration::seconds(i as i64), record.clone()))
        .collect()
}

/// Serialize records as a KISS stream of data frames
pub fn kiss_encode(records: &[Vec<u8>]) -> Vec<u8> {
    let mut stream = Vec::new();

    for record in records {
        stream.push(FEND);
        stream.push(DATA_FRAME);
        for &b in record {
            match b {
                FEND => stream.extend_from_slice(&[FESC, TFEND]),
                FESC => stream.extend_from_slice(&[FESC, TFESC]),
                _ => stream.push(b),
            }
        }
        stream.push(FEND);
    }

    stream
}

/// Serialize records as hex text, one upper-case record per line
pub fn hex_lines(records: &[Vec<u8>]) -> String {
    records
        .iter()
        .map(|record| hex::encode_upper(record) + "\n")
        .collect()
}

/// Serialize frames as a delimited export (`timestamp|hex` per line)
pub fn export_lines(frames: &[Frame]) -> String {
    frames
        .iter()
        .map(|frame| {
            format!(
                "{}|{}\n",
                frame.timestamp().format(EXPORT_TIMESTAMP_FORMAT),
                frame.to_hex()
            )
        })
        .collect()
}
