//! Command-line parsing for the `sat-imager` binary

use std::path::PathBuf;

use clap::Parser;

use crate::config::{load_config, CompletionPolicy, ConfigError, NamingPolicy};
use crate::pipeline::{InputKind, PipelineOptions};
use crate::profiles::SatelliteProfile;

/// Version with the git hash and build time, printed by `--version`
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SAT_IMAGER_GIT_HASH"),
    " built ",
    env!("SAT_IMAGER_BUILD_TIME"),
    ")"
);

const AFTER_HELP: &str = "\
Environment:
  SAT_IMAGER_GR_SATELLITES  Path of gr_satellites (default: /usr/bin/gr_satellites)
  RUST_LOG                  Log filter (default: info)

CSV exports can be requested from https://db.satnogs.org";

/// Recover JPEG images from satellite telemetry captures.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "sat-imager")]
#[command(version, long_version = LONG_VERSION, about, long_about = None)]
#[command(after_help = AFTER_HELP)]
pub struct CliArgs {
    /// Capture to process (.wav, .kss, .hex or .csv)
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Built-in profile: geoscan or stratosat
    #[arg(long, value_name = "NAME", default_value = "geoscan")]
    pub satellite: SatelliteProfile,

    /// Load the reassembly profile from a JSON file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Input type: wav, kss, hex or csv (default: from extension)
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<InputKind>,

    /// on-next-start, on-end-marker or single-stream-collect-all
    #[arg(long)]
    pub policy: Option<CompletionPolicy>,

    /// sequential-index or timestamp
    #[arg(long)]
    pub naming: Option<NamingPolicy>,

    /// Output directory (default: the input file's directory)
    #[arg(long = "out", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Build pipeline options, loading the JSON profile if one was given.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the JSON profile cannot be loaded.
    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        let mut options = PipelineOptions::from_profile(self.satellite.clone());

        if let Some(path) = &self.config {
            options.reassembly = load_config(path)?;
            log::info!("Loaded reassembly profile from {}", path.display());
        }
        if let Some(policy) = self.policy {
            options.reassembly.completion = policy;
        }
        if let Some(naming) = self.naming {
            options.reassembly.naming = naming;
        }
        options.kind = self.kind;
        options.out_dir = self.out_dir.clone();

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("sat-imager").chain(args.iter().copied()))
    }

    fn parse_err(args: &[&str]) -> clap::Error {
        parse(args).expect_err("Should be rejected")
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["pass.kss"]).unwrap();

        assert_eq!(args.input, PathBuf::from("pass.kss"));
        assert_eq!(args.satellite, SatelliteProfile::geoscan());
        assert!(args.kind.is_none());
        assert!(args.out_dir.is_none());
    }

    #[test]
    fn test_all_options() {
        let args = parse(&[
            "--satellite",
            "stratosat",
            "--type=csv",
            "--policy",
            "on-end-marker",
            "--naming",
            "timestamp",
            "--out",
            "/tmp/images",
            "export.txt",
        ])
        .unwrap();

        assert_eq!(args.satellite, SatelliteProfile::stratosat());
        assert_eq!(args.kind, Some(InputKind::Csv));
        assert_eq!(args.policy, Some(CompletionPolicy::OnEndMarker));
        assert_eq!(args.naming, Some(NamingPolicy::Timestamp));
        assert_eq!(args.out_dir, Some(PathBuf::from("/tmp/images")));

        let options = args.pipeline_options().unwrap();
        assert_eq!(options.reassembly.completion, CompletionPolicy::OnEndMarker);
        assert_eq!(options.reassembly.naming, NamingPolicy::Timestamp);
        assert_eq!(options.demodulator, None);
    }

    #[test]
    fn test_help_and_version() {
        let help = parse_err(&["--help"]);
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
        assert_eq!(help.exit_code(), 0);

        let version = parse_err(&["pass.kss", "--version"]);
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);
        assert_eq!(version.exit_code(), 0);
        assert!(version.to_string().contains(env!("SAT_IMAGER_GIT_HASH")));
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(parse_err(&[]).kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(
            parse_err(&["--frobnicate", "pass.kss"]).kind(),
            ErrorKind::UnknownArgument
        );
        assert_eq!(
            parse_err(&["--type", "bin", "pass.bin"]).kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse_err(&["--satellite", "sputnik", "pass.kss"]).kind(),
            ErrorKind::ValueValidation
        );

        for args in [&["pass.kss", "--out"][..], &["a.kss", "b.kss"][..], &[][..]] {
            assert_eq!(parse_err(args).exit_code(), 2, "{:?}", args);
        }
    }

    #[test]
    fn test_config_file_overrides_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            r#"{"markers":[{"label":"img","prefix":"03003e","name_prefix":"hr-"}],"offset_field":{"position":4,"width":4}}"#,
        )
        .unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--naming", "timestamp", "x.hex"]).unwrap();
        let options = args.pipeline_options().unwrap();

        assert_eq!(options.reassembly.markers[0].prefix, vec![0x03, 0x00, 0x3E]);
        assert_eq!(options.reassembly.offset_field.width, 4);
        assert_eq!(options.reassembly.naming, NamingPolicy::Timestamp);
        // Demodulator still comes from the selected satellite
        assert_eq!(options.demodulator.as_deref(), Some("GEOSCAN"));
    }
}
