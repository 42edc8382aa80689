//! `sat-imager` command-line entry point

use std::process::ExitCode;

fn main() -> ExitCode {
    sat_imager_lib::run()
}
