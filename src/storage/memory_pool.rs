use crate::core::Transaction;
use data_encoding::HEXLOWER;
use log::debug;

/// Ordered pool of transactions waiting to be mined.
///
/// The pool is seeded with a founding transaction and keeps insertion order.
/// It is non-empty only at construction: removals and mining may drain it.
/// Hashes are not required to be unique; lookups and removals address the first
/// match only.
#[derive(Debug, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new(founding_transaction: Transaction) -> Mempool {
        Mempool {
            transactions: vec![founding_transaction],
        }
    }

    /// Append to the tail. Always succeeds.
    pub fn add_transaction(&mut self, transaction: Transaction) {
        debug!(
            "Mempool accepted transaction {}",
            HEXLOWER.encode(transaction.get_hash())
        );
        self.transactions.push(transaction);
    }

    /// Index of the first transaction with the given hash.
    pub fn query_transaction(&self, hash: &[u8]) -> Option<usize> {
        self.transactions
            .iter()
            .position(|transaction| transaction.get_hash() == hash)
    }

    /// Remove the first transaction with the given hash, returning it.
    ///
    /// Returns `None` and leaves the pool untouched when the hash is unknown.
    pub fn remove_transaction(&mut self, hash: &[u8]) -> Option<Transaction> {
        let index = self.query_transaction(hash)?;
        Some(self.transactions.remove(index))
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
