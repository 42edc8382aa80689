//! Audio recordings via the external `gr_satellites` demodulator
//!
//! WAV recordings are demodulated by running
//! `gr_satellites <PROTOCOL> --wavfile <wav> --kiss_out <tmp>` and decoding
//! the KISS stream it writes. The temporary output lives in a scratch
//! directory that is removed when decoding finishes.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::frame::Frame;
use crate::frame_decoder::{read_kiss_file, DecodeError, Result};

/// Environment variable overriding the demodulator location
pub const DEMODULATOR_ENV: &str = "SAT_IMAGER_GR_SATELLITES";

/// Demodulator used when [`DEMODULATOR_ENV`] is not set
pub const DEFAULT_DEMODULATOR: &str = "/usr/bin/gr_satellites";

/// Runs the external demodulator and decodes its KISS output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDecoder {
    program: PathBuf,
    protocol: String,
}

impl AudioDecoder {
    /// Create a decoder for a demodulator binary and protocol name
    pub fn new(program: impl Into<PathBuf>, protocol: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            protocol: protocol.into(),
        }
    }

    /// Create a decoder using the demodulator from [`DEMODULATOR_ENV`]
    pub fn from_env(protocol: impl Into<String>) -> Self {
        let program = std::env::var_os(DEMODULATOR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMODULATOR));
        Self::new(program, protocol)
    }

    /// Demodulator binary
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Demodulate a recording into frames.
    ///
    /// A demodulator that runs but fails, or produces no output, yields no
    /// frames.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::ExternalTool` if the demodulator cannot be
    /// started, or `DecodeError::Io` if the scratch directory or the KISS
    /// output cannot be accessed.
    pub fn decode(&self, wav: &Path) -> Result<Vec<Frame>> {
        let scratch = tempfile::tempdir().map_err(|source| DecodeError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        let kiss_path = scratch.path().join("demodulated.kss");

        log::info!(
            "Demodulating {} with {} ({})",
            wav.display(),
            self.program.display(),
            self.protocol
        );

        let status = Command::new(&self.program)
            .arg(&self.protocol)
            .arg("--wavfile")
            .arg(wav)
            .arg("--kiss_out")
            .arg(&kiss_path)
            .status()
            .map_err(|source| DecodeError::ExternalTool {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            log::warn!("{} exited with {}", self.program.display(), status);
            return Ok(Vec::new());
        }

        if !kiss_path.exists() {
            log::warn!("{} produced no KISS output", self.program.display());
            return Ok(Vec::new());
        }

        read_kiss_file(&kiss_path)
    }
}
