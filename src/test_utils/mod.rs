//! Test utilities for `sat-imager`
//!
//! Provides synthetic record generation and capture serialization for
//! validating decoders and reassembly without real satellite recordings.

pub mod record_generator;

pub use record_generator::*;
