//! Shared helpers for unit tests
//!
//! Temporary data directories, low-difficulty chains and free local ports.

pub mod test_utils;

pub use test_utils::*;
