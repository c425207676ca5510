//! Core ledger functionality
//!
//! Transactions and their signatures, blocks, proof-of-work, difficulty
//! retargeting and the persistent chain itself.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod proof_of_work;
pub mod signature;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator, ChainHeader};
pub use difficulty::DifficultyAdjustment;
pub use proof_of_work::{CancelToken, ProofOfWork};
pub use signature::Signature;
pub use transaction::{Operation, Transaction};
