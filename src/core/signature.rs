use crate::error::{ChainError, Result};
use crate::utils::{fill_random, sha3_256_digest};
use once_cell::sync::Lazy;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

/// Shared secp256k1 context; building one is expensive so every signer reuses it.
static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Recoverable secp256k1 signature over a message's SHA3-256 digest.
///
/// `v` is the recovery id, `r` and `s` are the two scalar halves. Values are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Signature {
    v: u8,
    r: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    /// Sign `message` with a raw 32-byte secret key.
    pub fn sign(message: &[u8], secret_key: &[u8]) -> Result<Signature> {
        let secret_key = SecretKey::from_slice(secret_key)?;
        let digest = Message::from_digest(sha3_256_digest(message));
        let signature = SECP256K1.sign_ecdsa_recoverable(&digest, &secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);

        Ok(Signature {
            v: recovery_id.to_i32() as u8,
            r,
            s,
        })
    }

    /// Recover the uncompressed public key that produced this signature over `message`.
    pub fn recover_public_key(&self, message: &[u8]) -> Result<Vec<u8>> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.v))?;
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);

        let signature = RecoverableSignature::from_compact(&compact, recovery_id)?;
        let digest = Message::from_digest(sha3_256_digest(message));
        let public_key = SECP256K1.recover_ecdsa(&digest, &signature)?;
        Ok(public_key.serialize_uncompressed().to_vec())
    }

    pub fn get_v(&self) -> u8 {
        self.v
    }

    pub fn get_r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn get_s(&self) -> &[u8; 32] {
        &self.s
    }
}

/// Generate a fresh secret key from the system RNG, returned as raw bytes.
pub fn generate_secret_key() -> Result<[u8; 32]> {
    // Roughly 1 in 2^128 candidates falls outside the curve order
    loop {
        let mut candidate = [0u8; 32];
        fill_random(&mut candidate)?;
        if SecretKey::from_slice(&candidate).is_ok() {
            return Ok(candidate);
        }
    }
}

/// Uncompressed (65-byte SEC1) public key for a raw secret key.
pub fn public_key_from_secret(secret_key: &[u8]) -> Result<Vec<u8>> {
    let secret_key = SecretKey::from_slice(secret_key)
        .map_err(|e| ChainError::Crypto(format!("Invalid secret key: {e}")))?;
    let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);
    Ok(public_key.serialize_uncompressed().to_vec())
}
