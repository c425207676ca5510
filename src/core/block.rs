use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{deserialize, encode, serialize, sha3_digest};
use serde::{Deserialize, Serialize};

/// A block of transactions linked to its parent by hash.
///
/// A block starts life as a mining candidate whose `nonce`, `timestamp` and
/// `difficulty` are rewritten until the proof-of-work target is met, then
/// [`Block::seal`] fixes `hash`. Three encodings exist:
/// - [`Block::serialize`]: every field, used for storage and the wire
/// - [`Block::bytes_hash_safe`]: everything but `hash`, the preimage of `hash`
/// - [`Block::bytes_nonce_safe`]: everything but `hash` and `nonce`, the PoW preimage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    transactions: Vec<Transaction>,
    merkle_root: Vec<u8>,
    parent_hash: Vec<u8>,
    coinbase: Vec<u8>,
    difficulty: f64,
    nonce: u64,
    hash: Vec<u8>,
    timestamp: i64,
}

impl Block {
    pub fn new(
        transactions: Vec<Transaction>,
        parent_hash: &[u8],
        coinbase: &[u8],
        difficulty: f64,
        nonce: u64,
        timestamp: i64,
    ) -> Result<Block> {
        let merkle_root = Self::hash_transaction_sum(&transactions);

        let mut block = Block {
            transactions,
            merkle_root,
            parent_hash: parent_hash.to_vec(),
            coinbase: coinbase.to_vec(),
            difficulty,
            nonce,
            hash: vec![],
            timestamp,
        };
        block.seal()?;
        Ok(block)
    }

    /// Hash of the concatenated transaction hashes, in block order.
    ///
    /// This is a flat accumulator rather than a Merkle tree, so it fingerprints the
    /// transaction set but supports no inclusion proofs.
    pub fn hash_transaction_sum(transactions: &[Transaction]) -> Vec<u8> {
        let mut tx_hashes = vec![];
        for transaction in transactions {
            tx_hashes.extend_from_slice(transaction.get_hash());
        }

        sha3_digest(tx_hashes.as_slice())
    }

    /// Recompute `hash` from the hash-safe encoding.
    pub fn seal(&mut self) -> Result<()> {
        self.hash = sha3_digest(self.bytes_hash_safe()?.as_slice());
        Ok(())
    }

    pub fn bytes_hash_safe(&self) -> Result<Vec<u8>> {
        encode(&(
            &self.transactions,
            &self.merkle_root,
            &self.parent_hash,
            &self.coinbase,
            self.difficulty,
            self.nonce,
            self.timestamp,
        ))
    }

    pub fn bytes_nonce_safe(&self) -> Result<Vec<u8>> {
        encode(&(
            &self.transactions,
            &self.merkle_root,
            &self.parent_hash,
            &self.coinbase,
            self.difficulty,
            self.timestamp,
        ))
    }

    /// True when the stored hash matches the hash-safe encoding.
    pub fn verify_hash(&self) -> Result<bool> {
        Ok(sha3_digest(self.bytes_hash_safe()?.as_slice()) == self.hash)
    }

    pub fn verify_merkle_root(&self) -> bool {
        Self::hash_transaction_sum(&self.transactions) == self.merkle_root
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_merkle_root(&self) -> &[u8] {
        &self.merkle_root
    }

    pub fn get_parent_hash(&self) -> &[u8] {
        &self.parent_hash
    }

    pub fn get_coinbase(&self) -> &[u8] {
        &self.coinbase
    }

    pub fn get_difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_hash.is_empty()
    }

    // Candidate mutators, driven by the mining loop. Callers reseal afterwards.

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn set_difficulty(&mut self, difficulty: f64) {
        self.difficulty = difficulty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Operation;
    use crate::utils::HASH_LEN;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new_allocation(b"alice", 100.0).unwrap(),
            Transaction::new(1, b"bob", b"carol", 5.0, Operation::AddFile, b"readme").unwrap(),
        ]
    }

    #[test]
    fn test_new_block_is_sealed() {
        let block = Block::new(sample_transactions(), b"parent", b"miner", 1.0, 0, 1_000).unwrap();

        assert_eq!(block.get_hash().len(), HASH_LEN);
        assert!(block.verify_hash().unwrap());
        assert!(block.verify_merkle_root());
    }

    #[test]
    fn test_merkle_root_is_hash_of_concatenated_tx_hashes() {
        let txs = sample_transactions();
        let mut concatenated = txs[0].get_hash().to_vec();
        concatenated.extend_from_slice(txs[1].get_hash());

        let block = Block::new(txs, &[], &[], 1.0, 0, 0).unwrap();
        assert_eq!(block.get_merkle_root(), sha3_digest(&concatenated).as_slice());
    }

    #[test]
    fn test_nonce_change_requires_reseal() {
        let mut block = Block::new(sample_transactions(), b"p", b"m", 1.0, 0, 10).unwrap();
        block.set_nonce(42);
        assert!(!block.verify_hash().unwrap());

        block.seal().unwrap();
        assert!(block.verify_hash().unwrap());
    }

    #[test]
    fn test_nonce_safe_encoding_ignores_nonce() {
        let mut block = Block::new(sample_transactions(), b"p", b"m", 1.0, 0, 10).unwrap();
        let before_nonce = block.bytes_nonce_safe().unwrap();
        let before_hash_safe = block.bytes_hash_safe().unwrap();

        block.set_nonce(7);
        block.seal().unwrap();

        assert_eq!(block.bytes_nonce_safe().unwrap(), before_nonce);
        assert_ne!(block.bytes_hash_safe().unwrap(), before_hash_safe);
    }

    #[test]
    fn test_serialized_block_rehashes_to_same_hash() {
        let block = Block::new(sample_transactions(), b"p", b"m", 3.25, 99, 10).unwrap();
        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();

        assert_eq!(decoded, block);
        assert!(decoded.verify_hash().unwrap());
    }

    #[test]
    fn test_empty_block_has_merkle_root_of_empty_input() {
        let block = Block::new(vec![], &[], &[], 1.0, 0, 0).unwrap();
        assert_eq!(block.get_merkle_root(), sha3_digest(&[]).as_slice());
        assert!(block.is_genesis());
    }
}
