//! Capture format decoders producing canonical frames.
//!
//! Three on-disk formats are supported:
//!
//! - **KISS** link-layer streams (`.kss`), as written by `gr_satellites
//!   --kiss_out`. Frames are delimited by `0xC0`, data frames start with a
//!   `0x00` command byte, and payload bytes are escaped:
//!   ```text
//!   0xDB 0xDC -> 0xC0
//!   0xDB 0xDD -> 0xDB
//!   ```
//! - **Hex text** (`.hex`): one record per line, optionally prefixed with
//!   metadata separated by `|`. Whitespace inside the line is ignored.
//! - **Delimited exports** (`.csv`): `YYYY-MM-DD HH:MM:SS|HEXPAYLOAD` per
//!   line, as exported by the SatNOGS database.
//!
//! KISS and hex-text records carry no time; they all share the
//! [synthetic epoch](crate::frame::synthetic_epoch) so the reassembler keeps
//! their arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use sat_imager_lib::frame_decoder::read_kiss_file;
//!
//! let frames = read_kiss_file(Path::new("pass.kss"))?;
//! println!("{} frames decoded", frames.len());
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::frame::{Frame, EXPORT_TIMESTAMP_FORMAT};
use crate::frame_normalizer::FrameNormalizer;

/// KISS frame delimiter
pub const FEND: u8 = 0xC0;
/// KISS escape byte
pub const FESC: u8 = 0xDB;
/// Escaped form of [`FEND`]
pub const TFEND: u8 = 0xDC;
/// Escaped form of [`FESC`]
pub const TFESC: u8 = 0xDD;
/// Command byte marking a KISS data frame on port 0
pub const DATA_FRAME: u8 = 0x00;

/// Errors that abort decoding of a whole capture.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Capture file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Export line without the `|` separator.
    #[error("line {line}: missing '|' delimiter")]
    MissingDelimiter {
        /// 1-based line number.
        line: usize,
    },

    /// Export line whose timestamp does not match `YYYY-MM-DD HH:MM:SS`.
    #[error("line {line}: invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        /// 1-based line number.
        line: usize,
        /// Offending timestamp text.
        value: String,
        /// Parser error.
        #[source]
        source: chrono::ParseError,
    },

    /// External demodulator could not be started.
    #[error("failed to run {program}: {source}")]
    ExternalTool {
        /// Program that was invoked.
        program: PathBuf,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// KISS link layer
// =============================================================================

/// Undo KISS byte-stuffing in a single left-to-right pass.
///
/// Escape sequences never overlap; an escape byte followed by anything other
/// than [`TFEND`]/[`TFESC`] is kept verbatim.
pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if data[i] == FESC {
            match data.get(i + 1) {
                Some(&TFEND) => {
                    out.push(FEND);
                    i += 2;
                    continue;
                }
                Some(&TFESC) => {
                    out.push(FESC);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(data[i]);
        i += 1;
    }

    out
}

/// Decode a KISS byte stream into frames.
///
/// Empty fragments and non-data frames are skipped; records that are not
/// exactly one telemetry record long after unstuffing are dropped.
pub fn decode_kiss(stream: &[u8]) -> Vec<Frame> {
    let mut normalizer = FrameNormalizer::strict();
    let mut control_frames = 0usize;

    let frames: Vec<Frame> = stream
        .split(|&b| b == FEND)
        .filter(|fragment| !fragment.is_empty())
        .filter_map(|fragment| {
            if fragment[0] != DATA_FRAME {
                control_frames += 1;
                return None;
            }
            normalizer.accept_bytes(None, unstuff(&fragment[1..]))
        })
        .collect();

    let stats = normalizer.stats();
    log::debug!(
        "KISS: {} frames, {} dropped, {} non-data fragments",
        stats.accepted,
        stats.dropped(),
        control_frames
    );

    frames
}

/// Read and decode a KISS capture file.
///
/// # Errors
///
/// Returns `DecodeError::Io` if the file cannot be read.
pub fn read_kiss_file(path: &Path) -> Result<Vec<Frame>> {
    let frames = decode_kiss(&read_bytes(path)?);
    log::info!("Loaded {} frames from {}", frames.len(), path.display());
    Ok(frames)
}

// =============================================================================
// Hex text
// =============================================================================

/// Decode line-oriented hex text into frames.
///
/// Each line has its whitespace removed and keeps only the field after the
/// last `|`. Lines that are not exactly one record of hex are dropped.
pub fn decode_hex_text(text: &str) -> Vec<Frame> {
    let mut normalizer = FrameNormalizer::strict();

    let frames: Vec<Frame> = text
        .lines()
        .filter_map(|line| {
            let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.is_empty() {
                return None;
            }
            let record = compact.rsplit('|').next().unwrap_or_default();
            normalizer.accept_hex(None, record)
        })
        .collect();

    let stats = normalizer.stats();
    log::debug!(
        "Hex text: {} frames, {} lines dropped",
        stats.accepted,
        stats.dropped()
    );

    frames
}

/// Read and decode a hex text capture file.
///
/// # Errors
///
/// Returns `DecodeError::Io` if the file cannot be read.
pub fn read_hex_file(path: &Path) -> Result<Vec<Frame>> {
    let frames = decode_hex_text(&read_text(path)?);
    log::info!("Loaded {} frames from {}", frames.len(), path.display());
    Ok(frames)
}

// =============================================================================
// Delimited export
// =============================================================================

/// Parse an export timestamp (`YYYY-MM-DD HH:MM:SS`).
pub fn parse_export_timestamp(value: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, EXPORT_TIMESTAMP_FORMAT)
}

/// Decode a delimited export into frames.
///
/// Blank lines are ignored. The payload length is not checked.
///
/// # Errors
///
/// Returns `DecodeError::MissingDelimiter` or `DecodeError::InvalidTimestamp`
/// for the first malformed line; no frames are returned in that case.
pub fn decode_export(text: &str) -> Result<Vec<Frame>> {
    let mut normalizer = FrameNormalizer::trusting();
    let mut frames = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('|');
        let stamp = fields.next().unwrap_or_default();
        let payload = fields
            .next()
            .ok_or(DecodeError::MissingDelimiter { line: index + 1 })?;

        let timestamp =
            parse_export_timestamp(stamp).map_err(|source| DecodeError::InvalidTimestamp {
                line: index + 1,
                value: stamp.to_string(),
                source,
            })?;

        if let Some(frame) = normalizer.accept_hex(Some(timestamp), payload.trim()) {
            frames.push(frame);
        }
    }

    Ok(frames)
}

/// Read and decode a delimited export file.
///
/// # Errors
///
/// Returns `DecodeError::Io` if the file cannot be read, or any error from
/// [`decode_export`].
pub fn read_export_file(path: &Path) -> Result<Vec<Frame>> {
    let frames = decode_export(&read_text(path)?)?;
    log::info!("Loaded {} frames from {}", frames.len(), path.display());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{synthetic_epoch, FRAME_LEN};
    use crate::test_utils::kiss_encode;

    fn record(fill: u8) -> Vec<u8> {
        vec![fill; FRAME_LEN]
    }

    // =========================================================================
    // Byte unstuffing
    // =========================================================================

    #[test]
    fn test_unstuff_escapes() {
        assert_eq!(unstuff(&[0xDB, 0xDC]), vec![0xC0]);
        assert_eq!(unstuff(&[0xDB, 0xDD]), vec![0xDB]);
        assert_eq!(unstuff(&[0x01, 0xDB, 0xDC, 0x02]), vec![0x01, 0xC0, 0x02]);
    }

    #[test]
    fn test_unstuff_is_single_pass() {
        // 0xDB 0xDD decodes to 0xDB, which must not pair with the next 0xDC
        assert_eq!(unstuff(&[0xDB, 0xDD, 0xDC]), vec![0xDB, 0xDC]);
    }

    #[test]
    fn test_unstuff_keeps_unknown_escape() {
        assert_eq!(unstuff(&[0xDB, 0x01]), vec![0xDB, 0x01]);
        assert_eq!(unstuff(&[0x05, 0xDB]), vec![0x05, 0xDB]);
    }

    // =========================================================================
    // KISS
    // =========================================================================

    #[test]
    fn test_kiss_decodes_data_frames() {
        let records = vec![record(0x11), record(0x22)];
        let frames = decode_kiss(&kiss_encode(&records));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), records[0].as_slice());
        assert_eq!(frames[1].payload(), records[1].as_slice());
        assert!(frames.iter().all(|f| f.timestamp() == synthetic_epoch()));
    }

    #[test]
    fn test_kiss_restores_stuffed_bytes() {
        let mut payload = record(0x00);
        payload[10] = 0xC0;
        payload[11] = 0xDB;
        let frames = decode_kiss(&kiss_encode(std::slice::from_ref(&payload)));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), payload.as_slice());
    }

    #[test]
    fn test_kiss_skips_control_frames_and_short_records() {
        let mut stream = vec![FEND, 0x01];
        stream.extend_from_slice(&record(0x33));
        stream.extend_from_slice(&[FEND, FEND, DATA_FRAME, 0xAA, 0xBB, FEND]);

        assert!(decode_kiss(&stream).is_empty());
    }

    // =========================================================================
    // Hex text
    // =========================================================================

    #[test]
    fn test_hex_text_strips_metadata_and_whitespace() {
        let hex = "01003E".to_string() + &"00".repeat(FRAME_LEN - 3);
        let spaced: String = hex
            .as_bytes()
            .chunks(4)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(" ");
        let text = format!("2024-01-01 00:00:00 | RX | {}\n{}\n", spaced, hex);

        let frames = decode_hex_text(&text);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].payload()[..3], &[0x01, 0x00, 0x3E]);
        assert_eq!(frames[0], frames[1]);
    }

    #[test]
    fn test_hex_text_drops_wrong_length_line() {
        let text = format!("{}\n{}\n", "A".repeat(100), "B".repeat(128));
        let frames = decode_hex_text(&text);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().iter().all(|&b| b == 0xBB));
    }

    // =========================================================================
    // Delimited export
    // =========================================================================

    #[test]
    fn test_export_parses_timestamps() {
        let text = "2024-05-01 10:00:02|01003E00\n2024-05-01 10:00:01|02003E00\n\n";
        let frames = decode_export(text).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].timestamp(),
            parse_export_timestamp("2024-05-01 10:00:02").unwrap()
        );
        // No length filtering for exports
        assert_eq!(frames[1].payload(), &[0x02, 0x00, 0x3E, 0x00]);
    }

    #[test]
    fn test_export_rejects_bad_timestamp() {
        let text = "2024-05-01 10:00:02|01003E00\n01/05/2024|01003E00\n";
        let result = decode_export(text);

        assert!(matches!(
            result,
            Err(DecodeError::InvalidTimestamp { line: 2, .. })
        ));
    }

    #[test]
    fn test_export_rejects_missing_delimiter() {
        let result = decode_export("2024-05-01 10:00:02 01003E00\n");
        assert!(matches!(
            result,
            Err(DecodeError::MissingDelimiter { line: 1 })
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_hex_file(Path::new("/nonexistent/capture.hex"));
        assert!(matches!(result, Err(DecodeError::Io { .. })));
    }
}
