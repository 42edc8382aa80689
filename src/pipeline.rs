//! Decode → reassemble → emit for one capture file
//!
//! The input kind is taken from the file extension unless given explicitly.
//! Images are written next to the input file (or into an explicit output
//! directory), named after the input file stem.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use sat_imager_lib::pipeline::{process_file, PipelineOptions};
//! use sat_imager_lib::profiles::SatelliteProfile;
//!
//! let options = PipelineOptions::from_profile(SatelliteProfile::stratosat());
//! let summary = process_file(Path::new("pass.csv"), &options)?;
//! println!("{} of {} images saved", summary.images_saved, summary.images_found);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::audio::AudioDecoder;
use crate::config::{ConfigError, ReassemblyConfig};
use crate::emitter::{DirectorySink, EmitError, ImageSink};
use crate::frame::Frame;
use crate::frame_decoder::{read_export_file, read_hex_file, read_kiss_file, DecodeError};
use crate::profiles::SatelliteProfile;
use crate::reassembler::{reassemble, ReassemblyStats};

/// Errors that abort processing of an input file.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input file does not exist.
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Input type could not be determined or is not supported.
    #[error("unsupported input type '{0}' (expected wav, kss, hex or csv)")]
    UnsupportedType(String),

    /// WAV input for a satellite without a demodulator protocol.
    #[error("WAV input is not supported for {0}")]
    NoDemodulator(String),

    /// Capture could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Reassembly configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Output could not be prepared.
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl PipelineError {
    /// Whether the error stems from how the tool was invoked rather than
    /// from the input data
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::UnsupportedType(_) | Self::NoDemodulator(_))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Capture formats accepted as input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Audio recording, demodulated externally
    Wav,
    /// KISS link-layer stream
    Kiss,
    /// Line-oriented hex text
    Hex,
    /// Delimited export with timestamps
    Csv,
}

impl InputKind {
    /// Parse a type name (`wav`, `kss`/`kiss`, `hex`, `csv`).
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnsupportedType` for anything else.
    pub fn from_type_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "kss" | "kiss" => Ok(Self::Kiss),
            "hex" => Ok(Self::Hex),
            "csv" => Ok(Self::Csv),
            _ => Err(PipelineError::UnsupportedType(s.to_string())),
        }
    }

    /// Determine the input kind from a file extension.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnsupportedType` if the extension is missing
    /// or unknown.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_type_str(ext)
    }

    /// Canonical type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Kiss => "kss",
            Self::Hex => "hex",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for InputKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_type_str(s)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to process an input file
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Input kind; derived from the extension when `None`
    pub kind: Option<InputKind>,
    /// Reassembly settings; `name_base` is replaced by the input stem
    pub reassembly: ReassemblyConfig,
    /// Demodulator protocol for WAV input
    pub demodulator: Option<String>,
    /// Satellite name used in messages
    pub satellite: String,
    /// Output directory; defaults to the input file's directory
    pub out_dir: Option<PathBuf>,
}

impl PipelineOptions {
    /// Options for a built-in satellite preset
    pub fn from_profile(profile: SatelliteProfile) -> Self {
        Self {
            kind: None,
            reassembly: profile.reassembly,
            demodulator: profile.demodulator.map(str::to_string),
            satellite: profile.name.to_string(),
            out_dir: None,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_profile(SatelliteProfile::default())
    }
}

/// What happened while processing one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames produced by the decoder
    pub frames_decoded: usize,
    /// Images produced by the reassembler
    pub images_found: usize,
    /// Images written successfully
    pub images_saved: usize,
    /// Images whose emission failed
    pub failed_saves: usize,
    /// Where the saved images went
    pub saved: Vec<PathBuf>,
    /// Reassembly counters
    pub stats: ReassemblyStats,
}

/// Decode a capture file into frames.
///
/// # Errors
///
/// Returns `PipelineError::NoDemodulator` for WAV input without a protocol,
/// or any decode error.
pub fn decode_input(path: &Path, kind: InputKind, options: &PipelineOptions) -> Result<Vec<Frame>> {
    let frames = match kind {
        InputKind::Wav => {
            let protocol = options
                .demodulator
                .as_deref()
                .ok_or_else(|| PipelineError::NoDemodulator(options.satellite.clone()))?;
            AudioDecoder::from_env(protocol).decode(path)?
        }
        InputKind::Kiss => read_kiss_file(path)?,
        InputKind::Hex => read_hex_file(path)?,
        InputKind::Csv => read_export_file(path)?,
    };
    Ok(frames)
}

/// Reassemble frames and hand every finished image to `sink`.
///
/// Failed emissions are logged and counted; processing continues.
///
/// # Errors
///
/// Returns `PipelineError::Config` if the configuration is invalid.
pub fn reassemble_into<S: ImageSink + ?Sized>(
    frames: Vec<Frame>,
    config: ReassemblyConfig,
    sink: &mut S,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        frames_decoded: frames.len(),
        ..RunSummary::default()
    };

    let mut images = reassemble(frames, config)?;
    for image in images.by_ref() {
        summary.images_found += 1;
        match sink.emit(&image) {
            Ok(path) => {
                summary.images_saved += 1;
                summary.saved.push(path);
            }
            Err(e) => {
                log::warn!("{}: {}", image.name, e);
                summary.failed_saves += 1;
            }
        }
    }
    summary.stats = images.stats();

    Ok(summary)
}

/// Process one capture file end to end.
///
/// # Errors
///
/// Returns `PipelineError` if the input is missing, of an unsupported type,
/// cannot be decoded, or the output directory does not exist.
pub fn process_file(path: &Path, options: &PipelineOptions) -> Result<RunSummary> {
    if !path.is_file() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }

    let kind = match options.kind {
        Some(kind) => kind,
        None => InputKind::from_path(path)?,
    };

    let out_dir = match &options.out_dir {
        Some(dir) => dir.clone(),
        None => output_dir_for(path),
    };
    let mut sink = DirectorySink::new(out_dir)?;

    log::info!(
        "Processing {} as {} ({})",
        path.display(),
        kind,
        options.satellite
    );
    let frames = decode_input(path, kind, options)?;

    let mut config = options.reassembly.clone();
    config.name_base = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let summary = reassemble_into(frames, config, &mut sink)?;
    log_summary(path, &summary);

    Ok(summary)
}

/// Directory of the input file, or the current directory for bare names
fn output_dir_for(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn log_summary(path: &Path, summary: &RunSummary) {
    let stats = &summary.stats;
    log::info!(
        "{}: {} frames, {} images found, {} saved, {} failed",
        path.display(),
        summary.frames_decoded,
        summary.images_found,
        summary.images_saved,
        summary.failed_saves
    );
    log::info!(
        "Reassembly: {} written, {} retransmissions, {} unrelated, {} orphaned, {} stale, {} too short",
        stats.written,
        stats.retransmissions,
        stats.unknown_marker,
        stats.no_active_image,
        stats.stale_offset + stats.offset_too_large,
        stats.too_short
    );
}
