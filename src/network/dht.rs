// The peer table for one chain, plus the client half of the DHT protocol:
// bootstrapping a local copy from a remote node and announcing ourselves.
// The table is a plain replicated key -> peer map, there is no XOR routing here.

use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::network::connection::{read_frame, send_connection};
use crate::network::{
    Connection, ConnectionEvent, ConnectionEventType, ConnectionType, DhtServer, Peer,
    ServerHandle,
};
use crate::storage::PeerTable;
use crate::utils::{deserialize, serialize};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layout under the data directory: dht/<chain>/{store, dht_header.json}
const DHT_DIR: &str = "dht";
const STORE_DIR: &str = "store";
const HEADER_FILE: &str = "dht_header.json";

/// Chain metadata sent ahead of the peer entries during a bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct DhtHeader {
    pub config: ChainConfig,
    pub chain_id: String,
}

impl DhtHeader {
    pub fn new(config: ChainConfig) -> DhtHeader {
        DhtHeader {
            chain_id: config.chain.clone(),
            config,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<DhtHeader> {
        deserialize::<DhtHeader>(bytes)
    }
}

pub struct Dht {
    header: DhtHeader,
    data_dir: PathBuf,
    peer_table: Option<PeerTable>,
    serving: Option<Arc<AtomicBool>>, // Set while a server shares the table
}

impl Dht {
    /// Create the peer table for `config.chain`, seeded with `bootstrap_peer`.
    pub fn new(config: ChainConfig, bootstrap_peer: &Peer, data_dir: &Path) -> Result<Dht> {
        config.validate()?;
        let peer_table = PeerTable::open(&Self::store_path(data_dir, &config.chain))?;
        peer_table.insert(bootstrap_peer.public_key(), &bootstrap_peer.to_bytes()?)?;

        let mut dht = Dht {
            header: DhtHeader::new(config),
            data_dir: data_dir.to_path_buf(),
            peer_table: Some(peer_table),
            serving: None,
        };
        dht.write_to_disk()?;

        info!(
            "Created peer table for chain {} seeded with {}",
            dht.header.chain_id,
            bootstrap_peer.id()
        );
        Ok(dht)
    }

    pub fn read_from_disk(chain_id: &str, data_dir: &Path) -> Result<Dht> {
        let header = Self::read_header(data_dir, chain_id)?;
        let peer_table = PeerTable::open(&Self::store_path(data_dir, chain_id))?;

        Ok(Dht {
            header,
            data_dir: data_dir.to_path_buf(),
            peer_table: Some(peer_table),
            serving: None,
        })
    }

    pub fn read_header(data_dir: &Path, chain_id: &str) -> Result<DhtHeader> {
        let path = Self::dht_dir(data_dir, chain_id).join(HEADER_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            ChainError::Io(format!("Failed to read DHT header for chain {chain_id}: {e}"))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Persist the header: close the table, write, reopen. Refused while a
    /// server is using the table.
    pub fn write_to_disk(&mut self) -> Result<()> {
        if self.is_serving() {
            return Err(ChainError::Database(format!(
                "Peer table for chain {} is being served",
                self.header.chain_id
            )));
        }

        self.close_peer_table()?;
        let written = self.write_header();
        self.open_peer_table()?;
        written
    }

    fn write_header(&self) -> Result<()> {
        let dht_dir = Self::dht_dir(&self.data_dir, &self.header.chain_id);
        fs::create_dir_all(&dht_dir)?;
        fs::write(
            dht_dir.join(HEADER_FILE),
            serde_json::to_string_pretty(&self.header)?,
        )?;
        Ok(())
    }

    pub fn open_peer_table(&mut self) -> Result<()> {
        if self.peer_table.is_none() {
            let path = Self::store_path(&self.data_dir, &self.header.chain_id);
            self.peer_table = Some(PeerTable::open(&path)?);
        }
        Ok(())
    }

    pub fn close_peer_table(&mut self) -> Result<()> {
        if self.is_serving() {
            return Err(ChainError::Database(
                "Cannot close a peer table that is being served".to_string(),
            ));
        }
        if let Some(peer_table) = self.peer_table.take() {
            peer_table.flush()?;
        }
        Ok(())
    }

    fn peer_table(&self) -> Result<&PeerTable> {
        self.peer_table.as_ref().ok_or_else(|| {
            ChainError::Database(format!(
                "Peer table for chain {} is closed",
                self.header.chain_id
            ))
        })
    }

    /// Replicate the peer table of the node at `address` for `chain_id`.
    ///
    /// The first frame must be the remote header; every following `Response`
    /// event is collected. The exchange ends when the remote closes the stream,
    /// and only then are the entries written, in one batch. Any I/O or decoding
    /// failure aborts the whole bootstrap and leaves the local table untouched.
    pub fn bootstrap(
        address: &str,
        chain_id: &str,
        local_address: &str,
        data_dir: &Path,
    ) -> Result<Dht> {
        let local_peer = Peer::new(local_address, data_dir)?;
        let request = Connection::new(
            ConnectionType::DhtBootstrapRequest,
            vec![chain_id.as_bytes().to_vec()],
            local_peer.public_key(),
            address,
        );
        let mut stream = send_connection(address, &request)?;

        let header_frame = read_frame(&mut stream)?.ok_or_else(|| {
            ChainError::Protocol(format!(
                "{address} closed the bootstrap before sending a header"
            ))
        })?;
        let header = DhtHeader::deserialize(&header_frame)?;
        if header.chain_id != chain_id {
            return Err(ChainError::Protocol(format!(
                "Asked {address} for chain {chain_id}, got {}",
                header.chain_id
            )));
        }
        header.config.validate()?;

        // Nothing touches disk until the whole stream has been read
        let mut entries = vec![];
        while let Some(frame) = read_frame(&mut stream)? {
            let event = ConnectionEvent::deserialize(&frame)?;
            match event.get_type() {
                ConnectionEventType::Response => match event.key_value() {
                    Some((key, value)) => entries.push((key.to_vec(), value.to_vec())),
                    None => warn!("Ignoring malformed response from {address}"),
                },
                ConnectionEventType::Close => debug!("{address} closed the bootstrap"),
            }
        }
        let received = entries.len();

        let peer_table = PeerTable::open(&Self::store_path(data_dir, chain_id))?;
        peer_table.insert_all(entries)?;
        peer_table.flush()?;

        let mut dht = Dht {
            header,
            data_dir: data_dir.to_path_buf(),
            peer_table: Some(peer_table),
            serving: None,
        };
        dht.write_to_disk()?;

        info!("Bootstrapped chain {chain_id} from {address}: {received} peers");
        Ok(dht)
    }

    /// Serve this table on `local_peer`'s address. The server shares the table,
    /// so entries it receives are visible here at once.
    pub fn start_serving(&mut self, local_peer: Peer) -> Result<ServerHandle> {
        if self.is_serving() {
            return Err(ChainError::Network(format!(
                "Chain {} is already being served",
                self.header.chain_id
            )));
        }

        let mut server = DhtServer::new(local_peer, &self.data_dir);
        server.serve_chain(self.header.clone(), self.peer_table()?.clone());
        let handle = server.start()?;

        self.serving = Some(handle.running_flag());
        Ok(handle)
    }

    pub fn is_serving(&self) -> bool {
        self.serving
            .as_ref()
            .map(|running| running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Record `local_peer` locally, then announce it to the first known peer that
    /// accepts the join. That peer relays the announcement to the rest.
    pub fn join_network(&self, local_peer: &Peer) -> Result<()> {
        let peer_table = self.peer_table()?;
        peer_table.insert(local_peer.public_key(), &local_peer.to_bytes()?)?;
        peer_table.flush()?;

        let mut attempted = 0;
        for (key, value) in peer_table.entries()? {
            if key == local_peer.public_key() {
                continue;
            }
            let target = match Peer::from_bytes(&value) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Skipping unreadable peer record: {e}");
                    continue;
                }
            };

            attempted += 1;
            let joined =
                Self::send_join_request(target.connection_addr(), &self.header.chain_id, local_peer);
            match joined {
                Ok(()) => {
                    info!("Announced {} to {}", local_peer.id(), target.connection_addr());
                    return Ok(());
                }
                Err(e) => warn!("Join via {} failed: {e}", target.connection_addr()),
            }
        }

        if attempted == 0 {
            debug!("No other peers known for chain {}", self.header.chain_id);
            return Ok(());
        }
        Err(ChainError::Network(format!(
            "None of {attempted} known peers accepted the join"
        )))
    }

    /// Announce `peer` to the node at `target_address` and wait for it to finish.
    pub fn send_join_request(target_address: &str, chain_id: &str, peer: &Peer) -> Result<()> {
        let request = Connection::new(
            ConnectionType::PeerJoinRequest,
            vec![chain_id.as_bytes().to_vec(), peer.to_bytes()?],
            peer.public_key(),
            target_address,
        );
        let mut stream = send_connection(target_address, &request)?;

        while let Some(frame) = read_frame(&mut stream)? {
            let event = ConnectionEvent::deserialize(&frame)?;
            debug!("{target_address} answered join with {:?}", event.get_type());
        }
        Ok(())
    }

    /// Insert or overwrite a peer record by its public key.
    pub fn insert_peer(&self, peer: &Peer) -> Result<()> {
        self.peer_table()?.insert(peer.public_key(), &peer.to_bytes()?)
    }

    pub fn get_peer(&self, public_key: &[u8]) -> Result<Option<Peer>> {
        match self.peer_table()?.get(public_key)? {
            Some(bytes) => Ok(Some(Peer::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn peers(&self) -> Result<Vec<Peer>> {
        self.peer_table()?
            .entries()?
            .iter()
            .map(|(_, value)| Peer::from_bytes(value))
            .collect()
    }

    /// Raw `(public key, peer record)` pairs in key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.peer_table()?.entries()
    }

    pub fn contains(&self, public_key: &[u8]) -> Result<bool> {
        self.peer_table()?.contains(public_key)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.peer_table()?.len())
    }

    pub fn header(&self) -> &DhtHeader {
        &self.header
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn dht_dir(data_dir: &Path, chain_id: &str) -> PathBuf {
        data_dir.join(DHT_DIR).join(chain_id)
    }

    pub fn store_path(data_dir: &Path, chain_id: &str) -> PathBuf {
        Self::dht_dir(data_dir, chain_id).join(STORE_DIR)
    }
}
