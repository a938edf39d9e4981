//! Configuration for the jsonsmith service
//!
//! Values come from three layers, highest priority first: command-line/env
//! arguments (applied by the binary), an optional TOML file, built-in defaults.

pub mod types;

pub use types::*;
