//! Reassembly configuration
//!
//! One [`ReassemblyConfig`] describes how a satellite tags its image chunks:
//! which header prefixes mark image streams, where the byte offset lives in
//! the header, when an image counts as finished, and how finished images are
//! named. Presets live in [`profiles`](crate::profiles); custom setups can be
//! loaded from JSON.
//!
//! ```json
//! {
//!   "markers": [{ "label": "image", "prefix": "01003e" }],
//!   "offset_field": { "position": 5, "width": 2 },
//!   "completion": "on-next-start",
//!   "naming": "sequential-index"
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::HEADER_LEN;

/// Longest accepted stream marker in bytes
pub const MAX_MARKER_LEN: usize = 5;

/// Widest accepted offset field in bytes.
///
/// Known layouts use 2 or 3 bytes; wider fields are accepted and then bounded
/// by `MAX_IMAGE_LEN` in the reassembler.
pub const MAX_OFFSET_WIDTH: usize = 8;

/// Errors in a reassembly configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No stream markers configured.
    #[error("at least one stream marker is required")]
    NoMarkers,

    /// Marker prefix is empty or longer than [`MAX_MARKER_LEN`].
    #[error("marker '{label}' is {len} bytes (expected 1..=5)")]
    MarkerLength {
        /// Marker label.
        label: String,
        /// Actual prefix length.
        len: usize,
    },

    /// Offset field does not fit in the header.
    #[error("offset field at byte {position} with width {width} does not fit the 8-byte header")]
    OffsetField {
        /// Start byte within the header.
        position: usize,
        /// Field width in bytes.
        width: usize,
    },

    /// Policy or profile name not recognised.
    #[error("unknown {kind} '{value}'")]
    UnknownName {
        /// What was being parsed.
        kind: &'static str,
        /// Value given.
        value: String,
    },

    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for a profile.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Header prefix identifying one image stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMarker {
    /// Human-readable stream name used in logs
    pub label: String,
    /// Bytes the header must start with
    #[serde(with = "hex")]
    pub prefix: Vec<u8>,
    /// Prefix prepended to image ids from this stream (e.g. high resolution)
    #[serde(default)]
    pub name_prefix: Option<String>,
}

impl StreamMarker {
    /// Create a marker with no name prefix
    pub fn new(label: impl Into<String>, prefix: &[u8]) -> Self {
        Self {
            label: label.into(),
            prefix: prefix.to_vec(),
            name_prefix: None,
        }
    }

    /// Mark images from this stream with a distinguishing name prefix
    pub fn with_name_prefix(mut self, name_prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(name_prefix.into());
        self
    }

    /// Whether `header` belongs to this stream
    pub fn matches(&self, header: &[u8]) -> bool {
        header.starts_with(&self.prefix)
    }
}

/// Location of the little-endian byte offset inside the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetField {
    /// First header byte of the field
    pub position: usize,
    /// Field width in bytes
    pub width: usize,
}

impl OffsetField {
    /// Create an offset field descriptor
    pub const fn new(position: usize, width: usize) -> Self {
        Self { position, width }
    }

    /// Read the offset from a header, or `None` if the header is too short
    pub fn read(&self, header: &[u8]) -> Option<u64> {
        let bytes = header.get(self.position..self.position + self.width)?;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        )
    }
}

/// When an in-progress image is considered finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// A new, different start record for the same stream finishes the
    /// previous image
    #[default]
    OnNextStart,
    /// An end-of-image marker inside a written body finishes the image
    OnEndMarker,
    /// The first start record opens the only image; everything matching any
    /// marker is collected into it
    SingleStreamCollectAll,
}

/// How finished images are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingPolicy {
    /// Zero-padded index in order of discovery (`00000`, `00001`, ...)
    #[default]
    SequentialIndex,
    /// Timestamp of the start record (`20240501-100002`)
    Timestamp,
}

/// How overlapping marker prefixes are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerMatch {
    /// Most specific (longest) matching prefix wins
    #[default]
    Longest,
    /// First configured matching prefix wins
    First,
}

macro_rules! named_options {
    ($ty:ty, $kind:literal, { $($name:literal => $value:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_lowercase().as_str() {
                    $($name => Ok($value),)+
                    _ => Err(ConfigError::UnknownName {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

named_options!(CompletionPolicy, "completion policy", {
    "on-next-start" => CompletionPolicy::OnNextStart,
    "next-start" => CompletionPolicy::OnNextStart,
    "on-end-marker" => CompletionPolicy::OnEndMarker,
    "end-marker" => CompletionPolicy::OnEndMarker,
    "single-stream-collect-all" => CompletionPolicy::SingleStreamCollectAll,
    "collect-all" => CompletionPolicy::SingleStreamCollectAll,
});

named_options!(NamingPolicy, "naming policy", {
    "sequential-index" => NamingPolicy::SequentialIndex,
    "index" => NamingPolicy::SequentialIndex,
    "timestamp" => NamingPolicy::Timestamp,
});

named_options!(MarkerMatch, "marker match", {
    "longest" => MarkerMatch::Longest,
    "first" => MarkerMatch::First,
});

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OnNextStart => "on-next-start",
            Self::OnEndMarker => "on-end-marker",
            Self::SingleStreamCollectAll => "single-stream-collect-all",
        };
        f.write_str(name)
    }
}

/// Everything the reassembler needs to know about a satellite's image chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassemblyConfig {
    /// Image stream markers
    pub markers: Vec<StreamMarker>,
    /// Where the byte offset lives in the header
    pub offset_field: OffsetField,
    /// When an image is finished
    #[serde(default)]
    pub completion: CompletionPolicy,
    /// How images are named
    #[serde(default)]
    pub naming: NamingPolicy,
    /// How overlapping markers are resolved
    #[serde(default)]
    pub marker_match: MarkerMatch,
    /// Base prepended to every image name (usually the input file stem)
    #[serde(default)]
    pub name_base: String,
}

impl ReassemblyConfig {
    /// Config with a single image stream and default policies
    pub fn single_stream(marker: StreamMarker, offset_field: OffsetField) -> Self {
        Self {
            markers: vec![marker],
            offset_field,
            completion: CompletionPolicy::default(),
            naming: NamingPolicy::default(),
            marker_match: MarkerMatch::default(),
            name_base: String::new(),
        }
    }

    /// Check marker lengths and offset field placement.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a `ConfigError`.
    pub fn validate(&self) -> Result<()> {
        if self.markers.is_empty() {
            return Err(ConfigError::NoMarkers);
        }

        for marker in &self.markers {
            let len = marker.prefix.len();
            if len == 0 || len > MAX_MARKER_LEN {
                return Err(ConfigError::MarkerLength {
                    label: marker.label.clone(),
                    len,
                });
            }
        }

        let OffsetField { position, width } = self.offset_field;
        if width == 0 || width > MAX_OFFSET_WIDTH || position + width > HEADER_LEN {
            return Err(ConfigError::OffsetField { position, width });
        }

        Ok(())
    }

    /// Index of the marker a header belongs to, if any
    pub fn match_marker(&self, header: &[u8]) -> Option<usize> {
        let mut matching = self
            .markers
            .iter()
            .enumerate()
            .filter(|(_, marker)| marker.matches(header));

        match self.marker_match {
            MarkerMatch::First => matching.next().map(|(index, _)| index),
            // ties go to the first configured marker
            MarkerMatch::Longest => matching
                .fold(None, |best: Option<(usize, usize)>, (index, marker)| {
                    match best {
                        Some((_, len)) if len >= marker.prefix.len() => best,
                        _ => Some((index, marker.prefix.len())),
                    }
                })
                .map(|(index, _)| index),
        }
    }
}

/// Load a reassembly config from a JSON file.
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be read,
/// `ConfigError::Json` if it is not a valid config, or any
/// validation error.
pub fn load_config(path: &Path) -> Result<ReassemblyConfig> {
    let json = std::fs::read_to_string(path)?;
    let config: ReassemblyConfig = serde_json::from_str(&json)?;
    config.validate()?;
    Ok(config)
}
