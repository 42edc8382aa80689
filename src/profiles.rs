//! Built-in satellite presets
//!
//! Each preset pairs a [`ReassemblyConfig`] with the protocol name the
//! external demodulator expects, if recordings from that satellite can be
//! demodulated at all.

use std::str::FromStr;

use crate::config::{ConfigError, OffsetField, ReassemblyConfig, StreamMarker};

/// Image stream marker used by Geoscan-Edelveis
pub const GEOSCAN_IMAGE_MARKER: [u8; 3] = [0x01, 0x00, 0x3E];

/// Image stream marker used by Stratosat-TK1
pub const STRATOSAT_IMAGE_MARKER: [u8; 3] = [0x02, 0x00, 0x3E];

/// Reassembly settings for one satellite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteProfile {
    /// Satellite name used in logs
    pub name: &'static str,
    /// Chunk layout and policies
    pub reassembly: ReassemblyConfig,
    /// Protocol argument for `gr_satellites`, if WAV input is supported
    pub demodulator: Option<&'static str>,
}

impl SatelliteProfile {
    /// Geoscan-Edelveis: 2-byte offset at header bytes 5..7
    pub fn geoscan() -> Self {
        Self {
            name: "Geoscan-Edelveis",
            reassembly: ReassemblyConfig::single_stream(
                StreamMarker::new("image", &GEOSCAN_IMAGE_MARKER),
                OffsetField::new(5, 2),
            ),
            demodulator: Some("GEOSCAN"),
        }
    }

    /// Stratosat-TK1: 3-byte offset at header bytes 5..8
    pub fn stratosat() -> Self {
        Self {
            name: "Stratosat-TK1",
            reassembly: ReassemblyConfig::single_stream(
                StreamMarker::new("image", &STRATOSAT_IMAGE_MARKER),
                OffsetField::new(5, 3),
            ),
            demodulator: None,
        }
    }
}

impl Default for SatelliteProfile {
    fn default() -> Self {
        Self::geoscan()
    }
}

impl FromStr for SatelliteProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "geoscan" | "geoscan-edelveis" | "edelveis" => Ok(Self::geoscan()),
            "stratosat" | "stratosat-tk1" | "tk1" => Ok(Self::stratosat()),
            _ => Err(ConfigError::UnknownName {
                kind: "satellite",
                value: s.to_string(),
            }),
        }
    }
}
