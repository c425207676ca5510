use ring::rand::{SecureRandom, SystemRandom};
use sha3::{Digest, Sha3_256, Sha3_512};

use crate::error::{ChainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length in bytes of every structural hash (SHA3-512).
pub const HASH_LEN: usize = 64;

/// Unix time in whole seconds.
pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ChainError::Crypto(format!("System time error: {e}")))?
        .as_secs();

    if duration > i64::MAX as u64 {
        return Err(ChainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

/// Primary hash used for block hashes, transaction hashes and the merkle accumulator.
pub fn sha3_digest(data: &[u8]) -> Vec<u8> {
    Sha3_512::digest(data).to_vec()
}

/// 32-byte digest used as the secp256k1 signing message.
pub fn sha3_256_digest(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    let rng = SystemRandom::new();
    rng.fill(buf)
        .map_err(|e| ChainError::Crypto(format!("Failed to gather randomness: {e}")))
}
