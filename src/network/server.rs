use crate::error::{ChainError, Result};
use crate::network::connection::{
    read_frame, send_connection, write_frame, TCP_READ_TIMEOUT, TCP_WRITE_TIMEOUT,
};
use crate::network::{Connection, ConnectionEvent, ConnectionType, Dht, DhtHeader, Peer};
use crate::storage::PeerTable;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct ServedChain {
    header: DhtHeader,
    peer_table: PeerTable,
}

/// DHT server: answers bootstrap and join requests for the chains it serves.
///
/// Connections are handled one at a time on the server thread, one request per
/// connection. Because only that thread writes to the peer tables, a peer can
/// never be added twice by overlapping joins.
pub struct DhtServer {
    local_peer: Peer,
    data_dir: PathBuf,
    chains: HashMap<String, ServedChain>,
}

impl DhtServer {
    pub fn new(local_peer: Peer, data_dir: &Path) -> DhtServer {
        DhtServer {
            local_peer,
            data_dir: data_dir.to_path_buf(),
            chains: HashMap::new(),
        }
    }

    /// Serve `peer_table` for the chain named in `header`.
    pub fn serve_chain(&mut self, header: DhtHeader, peer_table: PeerTable) {
        self.chains
            .insert(header.chain_id.clone(), ServedChain { header, peer_table });
    }

    /// Bind the local peer's address and run the accept loop on its own thread.
    pub fn start(self) -> Result<ServerHandle> {
        let address = self.local_peer.connection_addr().to_string();
        let socket_addr = self.local_peer.address()?.to_socket_addr()?;
        let listener = TcpListener::bind(socket_addr)
            .map_err(|e| ChainError::Network(format!("Failed to bind to {address}: {e}")))?;
        let local_addr = listener.local_addr()?;

        info!(
            "DHT server {} listening on {address}",
            self.local_peer.id()
        );

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let stop = Arc::clone(&stop);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("dht-server".to_string())
                .spawn(move || self.run(listener, stop, running))?
        };

        Ok(ServerHandle {
            local_addr,
            stop,
            running,
            thread: Some(thread),
        })
    }

    fn run(mut self, listener: TcpListener, stop: Arc<AtomicBool>, running: Arc<AtomicBool>) {
        for stream in listener.incoming() {
            if stop.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let peer_addr = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    if let Err(e) = self.handle_connection(stream) {
                        error!("Error handling connection from {peer_addr}: {e}");
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        running.store(false, Ordering::SeqCst);
        info!("DHT server {} stopped", self.local_peer.id());
    }

    /// Read one request, dispatch it, then close the connection.
    fn handle_connection(&mut self, mut stream: TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
            .map_err(|e| ChainError::Network(format!("Failed to set write timeout: {e}")))?;

        let frame = match read_frame(&mut stream)? {
            Some(frame) => frame,
            None => {
                debug!("Connection closed before sending a request");
                return Ok(());
            }
        };
        let connection = Connection::deserialize(&frame)?;

        let result = match connection.get_type() {
            ConnectionType::DhtBootstrapRequest => {
                self.handle_bootstrap_request(&connection, &mut stream)
            }
            ConnectionType::PeerJoinRequest => self.handle_peer_join_request(&connection),
        };

        if let Err(e) = connection.close_from_receiver(&self.local_peer, &mut stream) {
            debug!("Close event not sent: {e}");
        }
        let _ = stream.shutdown(Shutdown::Both);
        result
    }

    /// Stream the chain header, then one `Response` per peer-table entry.
    fn handle_bootstrap_request(
        &mut self,
        connection: &Connection,
        stream: &mut TcpStream,
    ) -> Result<()> {
        let chain_id = Self::chain_id(connection)?;
        let (header, peer_table) = {
            let served = self.served_chain(&chain_id)?;
            (served.header.clone(), served.peer_table.clone())
        };

        write_frame(stream, &header.serialize()?)?;
        let entries = peer_table.entries()?;
        for (key, value) in &entries {
            write_frame(stream, &ConnectionEvent::response(key, value).serialize()?)?;
        }

        info!(
            "Served {} peers of chain {chain_id} to {}",
            entries.len(),
            bs58::encode(connection.get_sender_public_key()).into_string()
        );
        Ok(())
    }

    /// Add an unknown peer and relay the announcement to every other known peer.
    ///
    /// Known peers are ignored, which is what stops relays from looping. Relays
    /// are fire-and-forget: a peer that cannot be reached is logged and skipped.
    fn handle_peer_join_request(&mut self, connection: &Connection) -> Result<()> {
        let chain_id = Self::chain_id(connection)?;
        let peer_bytes = connection.get_meta().get(1).ok_or_else(|| {
            ChainError::Protocol("Join request carries no peer record".to_string())
        })?;
        let joining = Peer::from_bytes(peer_bytes)?;
        let peer_table = self.served_chain(&chain_id)?.peer_table.clone();

        if !peer_table.insert_if_absent(joining.public_key(), peer_bytes)? {
            debug!("Peer {} already known on chain {chain_id}", joining.id());
            return Ok(());
        }
        peer_table.flush()?;
        info!(
            "Peer {} at {} joined chain {chain_id}",
            joining.id(),
            joining.connection_addr()
        );

        for (key, value) in peer_table.entries()? {
            if key == self.local_peer.public_key() || key == joining.public_key() {
                continue;
            }
            let target = match Peer::from_bytes(&value) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Skipping unreadable peer record: {e}");
                    continue;
                }
            };

            let relay = connection.readdressed(target.connection_addr());
            match send_connection(target.connection_addr(), &relay) {
                Ok(_) => debug!(
                    "Relayed join of {} to {}",
                    joining.id(),
                    target.connection_addr()
                ),
                Err(e) => warn!(
                    "Failed to relay join of {} to {}: {e}",
                    joining.id(),
                    target.connection_addr()
                ),
            }
        }
        Ok(())
    }

    // Chains started with serve_chain are reused; others are opened from disk
    fn served_chain(&mut self, chain_id: &str) -> Result<&ServedChain> {
        if !self.chains.contains_key(chain_id) {
            let header = Dht::read_header(&self.data_dir, chain_id)?;
            let peer_table = PeerTable::open(&Dht::store_path(&self.data_dir, chain_id))?;
            info!("Opened peer table for chain {chain_id}");
            self.serve_chain(header, peer_table);
        }

        self.chains
            .get(chain_id)
            .ok_or_else(|| ChainError::Protocol(format!("Chain {chain_id} is not served")))
    }

    fn chain_id(connection: &Connection) -> Result<String> {
        let raw = connection.get_meta().first().ok_or_else(|| {
            ChainError::Protocol("Request carries no chain id".to_string())
        })?;
        let chain_id = String::from_utf8(raw.clone())
            .map_err(|e| ChainError::Protocol(format!("Chain id is not UTF-8: {e}")))?;

        let path_like = chain_id.contains(|c: char| c == '/' || c == '\\');
        if chain_id.is_empty() || path_like || chain_id == "." || chain_id == ".." {
            return Err(ChainError::Protocol(format!("Invalid chain id {chain_id:?}")));
        }
        Ok(chain_id)
    }
}

/// Owner's handle on a running [`DhtServer`]. Dropping it stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting and wait for the server thread to finish.
    pub fn stop_serving(&mut self) -> Result<()> {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return Ok(()),
        };

        self.stop.store(true, Ordering::SeqCst);
        // accept() only returns for a new connection
        if let Err(e) =
            TcpStream::connect_timeout(&self.local_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
        {
            warn!("Could not wake the DHT server: {e}");
        }

        thread
            .join()
            .map_err(|_| ChainError::Network("DHT server thread panicked".to_string()))
    }

    /// Block until the server thread exits.
    pub fn wait(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ChainError::Network("DHT server thread panicked".to_string())),
            None => Ok(()),
        }
    }

    pub fn is_serving(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop_serving() {
            error!("Failed to stop DHT server: {e}");
        }
    }
}
