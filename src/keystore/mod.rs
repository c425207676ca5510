//! Node key management
//!
//! The node's secp256k1 identity, created once and reused across restarts.

pub mod identity;

pub use identity::{Identity, IDENTITY_FILE};
