//! Frame shape validation and timestamp assignment
//!
//! Decoders hand every candidate record to a [`FrameNormalizer`], which
//! either returns a canonical [`Frame`] or drops the record. Drops are
//! record-level anomalies: they are logged and counted, never raised.

use chrono::NaiveDateTime;

use crate::frame::{synthetic_epoch, Frame, FRAME_LEN};

/// Record length requirement applied before a record becomes a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLength {
    /// Record must be exactly this many bytes
    Exact(usize),
    /// Accept any length (trusted exports)
    #[default]
    Any,
}

/// Counters for records seen by a normalizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Records that became frames
    pub accepted: usize,
    /// Records dropped for having the wrong length
    pub wrong_length: usize,
    /// Records dropped because they were not valid hex
    pub invalid_hex: usize,
}

impl NormalizeStats {
    /// Total number of dropped records
    pub fn dropped(&self) -> usize {
        self.wrong_length + self.invalid_hex
    }
}

/// Turns raw candidate records into validated, timestamped frames
#[derive(Debug, Clone)]
pub struct FrameNormalizer {
    record_length: RecordLength,
    default_timestamp: NaiveDateTime,
    stats: NormalizeStats,
}

impl FrameNormalizer {
    /// Create a normalizer with a length requirement and a fallback timestamp
    pub fn new(record_length: RecordLength, default_timestamp: NaiveDateTime) -> Self {
        Self {
            record_length,
            default_timestamp,
            stats: NormalizeStats::default(),
        }
    }

    /// Normalizer for formats without per-record time: exact
    /// [`FRAME_LEN`] records, all stamped with the synthetic epoch
    pub fn strict() -> Self {
        Self::new(RecordLength::Exact(FRAME_LEN), synthetic_epoch())
    }

    /// Normalizer for trusted exports: no length filtering
    pub fn trusting() -> Self {
        Self::new(RecordLength::Any, synthetic_epoch())
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }

    /// Accept a record given as raw bytes.
    ///
    /// `timestamp` falls back to the normalizer's default when `None`.
    pub fn accept_bytes(
        &mut self,
        timestamp: Option<NaiveDateTime>,
        bytes: Vec<u8>,
    ) -> Option<Frame> {
        if let RecordLength::Exact(expected) = self.record_length {
            if bytes.len() != expected {
                log::debug!(
                    "Dropping record: {} bytes (expected {})",
                    bytes.len(),
                    expected
                );
                self.stats.wrong_length += 1;
                return None;
            }
        }

        self.stats.accepted += 1;
        Some(Frame::new(
            timestamp.unwrap_or(self.default_timestamp),
            bytes,
        ))
    }

    /// Accept a record given as a hex string (case-insensitive).
    ///
    /// The length check is applied to the text first, so a short line is
    /// reported as a length problem even if it also contains bad digits.
    pub fn accept_hex(&mut self, timestamp: Option<NaiveDateTime>, text: &str) -> Option<Frame> {
        if let RecordLength::Exact(expected) = self.record_length {
            if text.len() != expected * 2 {
                log::debug!(
                    "Dropping hex record: {} characters (expected {})",
                    text.len(),
                    expected * 2
                );
                self.stats.wrong_length += 1;
                return None;
            }
        }

        match hex::decode(text) {
            Ok(bytes) => self.accept_bytes(timestamp, bytes),
            Err(e) => {
                log::warn!("Dropping record with invalid hex: {}", e);
                self.stats.invalid_hex += 1;
                None
            }
        }
    }
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::strict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record_hex() -> String {
        "AB".repeat(FRAME_LEN)
    }

    #[test]
    fn test_strict_accepts_exact_length() {
        let mut normalizer = FrameNormalizer::strict();
        let frame = normalizer.accept_hex(None, &record_hex()).unwrap();

        assert_eq!(frame.payload().len(), FRAME_LEN);
        assert_eq!(frame.timestamp(), synthetic_epoch());
        assert_eq!(normalizer.stats().accepted, 1);
    }

    #[test]
    fn test_strict_drops_100_character_line() {
        let mut normalizer = FrameNormalizer::strict();
        let short = "0".repeat(100);

        assert!(normalizer.accept_hex(None, &short).is_none());
        assert_eq!(normalizer.stats().wrong_length, 1);
        assert_eq!(normalizer.stats().accepted, 0);
    }

    #[test]
    fn test_strict_drops_long_byte_record() {
        let mut normalizer = FrameNormalizer::strict();
        assert!(normalizer.accept_bytes(None, vec![0u8; 65]).is_none());
        assert!(normalizer.accept_bytes(None, vec![0u8; 63]).is_none());
        assert_eq!(normalizer.stats().dropped(), 2);
    }

    #[test]
    fn test_lower_case_hex_accepted() {
        let mut normalizer = FrameNormalizer::strict();
        let frame = normalizer.accept_hex(None, &"ff".repeat(FRAME_LEN)).unwrap();
        assert!(frame.payload().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_invalid_hex_dropped() {
        let mut normalizer = FrameNormalizer::strict();
        let bad = "ZZ".repeat(FRAME_LEN);

        assert!(normalizer.accept_hex(None, &bad).is_none());
        assert_eq!(normalizer.stats().invalid_hex, 1);
    }

    #[test]
    fn test_trusting_keeps_any_length_and_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let mut normalizer = FrameNormalizer::trusting();
        let frame = normalizer.accept_hex(Some(ts), "01003E").unwrap();

        assert_eq!(frame.payload(), &[0x01, 0x00, 0x3E]);
        assert_eq!(frame.timestamp(), ts);
    }
}
