//! Data storage and persistence
//!
//! The sled-backed block store and peer table, plus the in-memory pool of
//! transactions waiting to be mined.

pub mod block_store;
pub mod database;
pub mod memory_pool;
pub mod peer_table;

pub use block_store::BlockStore;
pub use memory_pool::Mempool;
pub use peer_table::PeerTable;
