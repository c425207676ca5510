//! Command-line interface
//!
//! Argument parsing for the `peerchain` binary.

pub mod commands;

pub use commands::{Command, Opt};
