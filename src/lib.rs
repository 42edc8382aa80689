//! `sat-imager` - JPEG image recovery from satellite telemetry
//!
//! Small satellites downlink photographs as 64-byte telemetry records, each
//! carrying a chunk of a JPEG file and the byte offset of that chunk. This
//! crate decodes captures of those records (demodulated audio, KISS streams,
//! hex dumps, SatNOGS exports), puts the chunks back together, and writes the
//! recovered images.
//!
//! # Example
//!
//! ```rust,ignore
//! use sat_imager_lib::frame_decoder::read_kiss_file;
//! use sat_imager_lib::profiles::SatelliteProfile;
//! use sat_imager_lib::reassembler::reassemble;
//!
//! let frames = read_kiss_file(Path::new("pass.kss"))?;
//! for image in reassemble(frames, SatelliteProfile::geoscan().reassembly)? {
//!     std::fs::write(format!("{}.jpg", image.name), &image.content)?;
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod frame;
pub mod frame_decoder;
pub mod frame_normalizer;
pub mod pipeline;
pub mod profiles;
pub mod reassembler;
pub mod test_utils;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cli::{CliArgs, LONG_VERSION};
use pipeline::{process_file, PipelineError, RunSummary};

/// Version string with build metadata
pub fn version() -> String {
    format!("sat-imager {}", LONG_VERSION)
}

/// Command-line entry point
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Help and version come back as errors with exit code 0
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(2));
        }
    };

    match process(&args) {
        Ok(summary) => {
            if summary.images_found == 0 {
                log::info!("No images found in {}", args.input.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(exit_status_for(&e))
        }
    }
}

fn process(args: &CliArgs) -> anyhow::Result<RunSummary> {
    let options = args
        .pipeline_options()
        .context("failed to load reassembly profile")?;

    process_file(&args.input, &options)
        .with_context(|| format!("failed to process {}", args.input.display()))
}

/// Usage problems exit with 2, everything else with 1
fn exit_status_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.is_usage_error() => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str) -> CliArgs {
        CliArgs::try_parse_from(["sat-imager", input]).unwrap()
    }

    #[test]
    fn test_version_includes_package_version() {
        assert!(version().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unsupported_type_exits_with_usage_code() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("capture.bin");
        std::fs::write(&input, b"").unwrap();

        let err = process(&args(input.to_str().unwrap())).unwrap_err();
        assert_eq!(exit_status_for(&err), 2);
    }

    #[test]
    fn test_missing_input_exits_with_failure() {
        let err = process(&args("/nonexistent/pass.kss")).unwrap_err();
        assert_eq!(exit_status_for(&err), 1);
    }
}
