use crate::core::{Block, DifficultyAdjustment};
use crate::error::{ChainError, Result};
use crate::utils::{current_timestamp, sha3_digest};
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Width of the comparison target in bytes.
pub const TARGET_LEN: usize = 32;

// Fixed-point precision used to divide by 2^frac(difficulty)
const FRACTION_BITS: u32 = 52;

// Largest shift that can still leave a quotient below 2^256
const MAX_TARGET_EXPONENT: f64 = (8 * TARGET_LEN as u32 + FRACTION_BITS + 1) as f64;

/// Shared stop flag for a running miner.
///
/// Cloning hands out another handle to the same flag, so a CLI signal handler or a
/// test can stop a miner running on another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ProofOfWork;

impl ProofOfWork {
    /// `floor(2^255 / 2^difficulty)` as a 32-byte big-endian value.
    ///
    /// Targets that would exceed 256 bits saturate to all ones; a difficulty above
    /// roughly 307 yields the zero target, which nothing can meet. A non-finite
    /// difficulty is a fatal configuration error.
    pub fn target(difficulty: f64) -> Result<[u8; TARGET_LEN]> {
        if !difficulty.is_finite() {
            return Err(ChainError::Fatal(format!(
                "Block difficulty overflow: {difficulty} is not finite"
            )));
        }

        let whole = difficulty.floor();
        let frac = difficulty - whole;
        let exponent = 255.0 + f64::from(FRACTION_BITS) - whole;

        if exponent < 0.0 {
            return Ok([0u8; TARGET_LEN]);
        }
        if exponent > MAX_TARGET_EXPONENT {
            return Ok([0xFF; TARGET_LEN]);
        }

        // 2^frac lies in [1, 2), so the divisor lies in [2^52, 2^53)
        let divisor = (frac.exp2() * (1u64 << FRACTION_BITS) as f64).round() as u64;
        let numerator = BigUint::from(1u8) << (exponent as usize);
        let quotient = numerator / BigUint::from(divisor);

        let bytes = quotient.to_bytes_be();
        if bytes.len() > TARGET_LEN {
            return Ok([0xFF; TARGET_LEN]);
        }

        let mut target = [0u8; TARGET_LEN];
        target[TARGET_LEN - bytes.len()..].copy_from_slice(&bytes);
        Ok(target)
    }

    /// `H(H(nonce-safe encoding) || nonce as big-endian u64)`
    pub fn candidate_hash(block: &Block) -> Result<Vec<u8>> {
        let mut data = sha3_digest(block.bytes_nonce_safe()?.as_slice());
        data.extend_from_slice(&block.get_nonce().to_be_bytes());
        Ok(sha3_digest(data.as_slice()))
    }

    /// True when the block's nonce meets the target derived from its own difficulty.
    pub fn validate(block: &Block) -> Result<bool> {
        let target = Self::target(block.get_difficulty())?;
        let hash = Self::candidate_hash(block)?;

        Ok(hash[..TARGET_LEN] < target[..])
    }

    /// Drive a candidate until it meets its target, then seal it.
    ///
    /// Each retry bumps the nonce, moves the timestamp to `max(now, parent + 1)` and
    /// recomputes the difficulty against `parent`. The loop ends with
    /// `ChainError::Mining` when `cancel` fires or the nonce reaches `max_nonce`.
    pub fn mine(
        block: &mut Block,
        parent: &Block,
        cancel: &CancelToken,
        max_nonce: Option<u64>,
    ) -> Result<()> {
        let limit = max_nonce.unwrap_or(u64::MAX);
        debug!(
            "Mining on parent {} at difficulty {}",
            HEXLOWER.encode(parent.get_hash()),
            block.get_difficulty()
        );

        loop {
            if Self::validate(block)? {
                block.seal()?;
                info!(
                    "Found nonce {} for block {}",
                    block.get_nonce(),
                    HEXLOWER.encode(block.get_hash())
                );
                return Ok(());
            }

            if cancel.is_cancelled() {
                return Err(ChainError::Mining("Mining cancelled".to_string()));
            }
            if block.get_nonce() >= limit {
                return Err(ChainError::Mining(format!(
                    "Nonce space exhausted at {limit}"
                )));
            }

            let timestamp = current_timestamp()?.max(parent.get_timestamp() + 1);
            block.set_nonce(block.get_nonce() + 1);
            block.set_timestamp(timestamp);
            block.set_difficulty(DifficultyAdjustment::calculate_difficulty(parent, timestamp));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    fn candidate(difficulty: f64) -> Block {
        let tx = Transaction::new_allocation(b"alice", 10.0).unwrap();
        Block::new(vec![tx], b"parent", b"miner", difficulty, 0, 1_000).unwrap()
    }

    #[test]
    fn test_target_at_whole_difficulties() {
        let zero = ProofOfWork::target(0.0).unwrap();
        assert_eq!(zero[0], 0x80);
        assert!(zero[1..].iter().all(|b| *b == 0));

        let one = ProofOfWork::target(1.0).unwrap();
        assert_eq!(one[0], 0x40);

        let eight = ProofOfWork::target(8.0).unwrap();
        assert_eq!(eight[0], 0x00);
        assert_eq!(eight[1], 0x80);
    }

    #[test]
    fn test_target_shrinks_with_difficulty() {
        let easy = ProofOfWork::target(1.0).unwrap();
        let middle = ProofOfWork::target(1.5).unwrap();
        let hard = ProofOfWork::target(2.0).unwrap();

        assert!(middle < easy);
        assert!(hard < middle);
    }

    #[test]
    fn test_target_saturates() {
        assert_eq!(ProofOfWork::target(-5.0).unwrap(), [0xFF; TARGET_LEN]);
        assert_eq!(ProofOfWork::target(400.0).unwrap(), [0u8; TARGET_LEN]);
    }

    #[test]
    fn test_infinite_difficulty_is_fatal() {
        assert!(matches!(
            ProofOfWork::target(f64::INFINITY),
            Err(ChainError::Fatal(_))
        ));

        let block = candidate(f64::INFINITY);
        assert!(matches!(
            ProofOfWork::validate(&block),
            Err(ChainError::Fatal(_))
        ));
    }

    #[test]
    fn test_candidate_hash_depends_on_nonce() {
        let mut block = candidate(1.0);
        let first = ProofOfWork::candidate_hash(&block).unwrap();
        block.set_nonce(1);
        let second = ProofOfWork::candidate_hash(&block).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_perturbed_nonce_fails_validation() {
        // One nonce in 256 meets a difficulty of 8
        let mut block = candidate(8.0);
        while !ProofOfWork::validate(&block).unwrap() {
            block.set_nonce(block.get_nonce() + 1);
        }
        block.seal().unwrap();
        let found = block.get_nonce();

        let still_valid = (1..=32)
            .filter(|offset| {
                let mut perturbed = block.clone();
                perturbed.set_nonce(found.wrapping_add(*offset));
                ProofOfWork::validate(&perturbed).unwrap()
            })
            .count();
        assert!(still_valid <= 2, "{still_valid} of 32 perturbed nonces passed");
    }

    #[test]
    fn test_mine_produces_valid_sealed_block() {
        let parent = candidate(1.0);
        let mut block = Block::new(vec![], parent.get_hash(), b"miner", 1.0, 0, 1_001).unwrap();

        ProofOfWork::mine(&mut block, &parent, &CancelToken::new(), None).unwrap();

        assert!(ProofOfWork::validate(&block).unwrap());
        assert!(block.verify_hash().unwrap());
    }

    #[test]
    fn test_cancelled_miner_stops() {
        let parent = candidate(1.0);
        // The zero target can never be met
        let mut block = Block::new(vec![], parent.get_hash(), b"miner", 400.0, 0, 1_001).unwrap();
        let cancel = CancelToken::new();
        let handle = cancel.clone();
        handle.cancel();

        let result = ProofOfWork::mine(&mut block, &parent, &cancel, None);
        assert!(matches!(result, Err(ChainError::Mining(_))));
    }

    #[test]
    fn test_nonce_limit_stops_miner() {
        let parent = candidate(400.0);
        let mut block = Block::new(vec![], parent.get_hash(), b"miner", 400.0, 0, 1_001).unwrap();

        let result = ProofOfWork::mine(&mut block, &parent, &CancelToken::new(), Some(16));
        assert!(matches!(result, Err(ChainError::Mining(_))));
        assert_eq!(block.get_nonce(), 16);
    }
}
