//! # Peerchain - A Proof-of-Work Ledger With DHT Peer Discovery
//!
//! This is my small blockchain node: a chain of proof-of-work blocks stored
//! in sled, and a peer table that nodes replicate and grow as peers join.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Ledger**: SHA3-512 blocks, a per-block merkle accumulator and a
//!   difficulty that retargets from the parent's block time
//! - **Transactions**: secp256k1 recoverable signatures over a SHA3-256 digest
//! - **Mempool**: an ordered list of pending transactions
//! - **DHT**: a replicated public key -> peer table per chain, served over TCP
//!   with length-prefixed bincode frames
//!
//! ## How I Organized My Code
//! - `core/`: blocks, transactions, proof-of-work, difficulty and the chain
//! - `storage/`: sled block store, sled peer table, the mempool
//! - `network/`: peers, the wire envelopes, the DHT client and server
//! - `keystore/`: the node identity
//! - `config/`: node settings and genesis configuration
//! - `utils/`: hashing, randomness and the codec
//! - `cli/`: command-line interface
//!
//! ## Things That Bit Me
//! 1. The head block is an explicit pointer in the store, never "the last key"
//! 2. A bootstrap or join exchange ends when the server closes the stream
//! 3. Only the server thread writes peer tables, so joins never double-insert

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod keystore;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{ChainConfig, Settings};
pub use core::{
    Block, Blockchain, CancelToken, DifficultyAdjustment, Operation, ProofOfWork, Signature,
    Transaction,
};
pub use error::{ChainError, Result};
pub use keystore::Identity;
pub use network::{
    Connection, ConnectionEvent, ConnectionEventType, ConnectionType, Dht, DhtHeader, DhtServer,
    Peer, PeerAddress, ServerHandle,
};
pub use storage::{BlockStore, Mempool, PeerTable};
pub use utils::{current_timestamp, sha3_digest};
