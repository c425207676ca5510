//! Peer-to-peer networking
//!
//! Peers find each other through a small DHT: every node keeps a replicated
//! table of the peers on its chain, new nodes copy it from a bootstrap node,
//! and join announcements are relayed to everyone already in the table.

pub mod connection;
pub mod dht;
pub mod peer;
pub mod server;

pub use connection::{Connection, ConnectionEvent, ConnectionEventType, ConnectionType};
pub use dht::{Dht, DhtHeader};
pub use peer::{Peer, PeerAddress, Protocol};
pub use server::{DhtServer, ServerHandle};
