//! Utility functions and helpers
//!
//! Hashing, randomness, wall-clock time and the bincode codec used
//! throughout the ledger and the wire protocol.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, fill_random, sha3_256_digest, sha3_digest, HASH_LEN};

pub use serialization::{deserialize, encode, serialize, DECODE_LIMIT};
