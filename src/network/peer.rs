use crate::error::{ChainError, Result};
use crate::keystore::Identity;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

pub const KEYSTORE_DIR: &str = "keystore";
pub const PEER_FILE: &str = "peer.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    IPv4,
    IPv6,
}

/// Parsed form of a `/ipv4|ipv6/<host>/tcp/<port>` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub network: String,
    pub host: String,
    pub transport: String,
    pub port: u16,
}

impl PeerAddress {
    /// Split on `/`. Fewer than four segments is a parse failure.
    pub fn parse(address: &str) -> Result<PeerAddress> {
        let segments: Vec<&str> = address.trim_start_matches('/').split('/').collect();
        if segments.len() < 4 {
            return Err(ChainError::Protocol(format!(
                "Malformed peer address {address}: expected /<ipv4|ipv6>/<host>/tcp/<port>"
            )));
        }

        let port = segments[3].parse::<u16>().map_err(|e| {
            ChainError::Protocol(format!("Malformed port in peer address {address}: {e}"))
        })?;

        Ok(PeerAddress {
            network: segments[0].to_string(),
            host: segments[1].to_string(),
            transport: segments[2].to_string(),
            port,
        })
    }

    pub fn protocol(&self) -> Protocol {
        if self.network.contains("ipv6") {
            Protocol::IPv6
        } else {
            Protocol::IPv4
        }
    }

    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChainError::Network(format!("Could not resolve {}", self.host)))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}",
            self.network, self.host, self.transport, self.port
        )
    }
}

/// A node on the network: its public key and where to reach it.
///
/// This is the record stored as the value of a DHT peer-table entry, keyed by
/// `public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    public_key: Vec<u8>,
    protocol: Protocol,
    connection_addr: String,
}

impl Peer {
    /// The local peer for `address`, backed by the identity in `data_dir`.
    ///
    /// The identity is created on first use and reused afterwards; the resulting
    /// peer record is written to `keystore/peer.json` before returning.
    pub fn new(address: &str, data_dir: &Path) -> Result<Peer> {
        let identity = Identity::load_or_create(&Self::keystore_dir(data_dir))?;
        let peer = Self::with_public_key(identity.public_key(), address)?;
        peer.write_to_disk(data_dir)?;
        Ok(peer)
    }

    /// A peer record for a key held elsewhere. Nothing is persisted.
    pub fn with_public_key(public_key: &[u8], address: &str) -> Result<Peer> {
        let parsed = PeerAddress::parse(address)?;
        Ok(Peer {
            public_key: public_key.to_vec(),
            protocol: parsed.protocol(),
            connection_addr: address.to_string(),
        })
    }

    pub fn read_from_disk(data_dir: &Path) -> Result<Peer> {
        let path = Self::keystore_dir(data_dir).join(PEER_FILE);
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn write_to_disk(&self, data_dir: &Path) -> Result<()> {
        let keystore_dir = Self::keystore_dir(data_dir);
        fs::create_dir_all(&keystore_dir)?;
        fs::write(
            keystore_dir.join(PEER_FILE),
            serde_json::to_string_pretty(self)?,
        )?;
        debug!("Saved peer record for {}", self.connection_addr);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Peer> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Base58 form of the public key, for logs and the CLI.
    pub fn id(&self) -> String {
        bs58::encode(&self.public_key).into_string()
    }

    pub fn address(&self) -> Result<PeerAddress> {
        PeerAddress::parse(&self.connection_addr)
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn connection_addr(&self) -> &str {
        &self.connection_addr
    }

    pub fn keystore_dir(data_dir: &Path) -> PathBuf {
        data_dir.join(KEYSTORE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_address() {
        let address = PeerAddress::parse("/ipv4/127.0.0.1/tcp/3048").unwrap();
        assert_eq!(address.host, "127.0.0.1");
        assert_eq!(address.port, 3048);
        assert_eq!(address.protocol(), Protocol::IPv4);
        assert_eq!(address.to_string(), "/ipv4/127.0.0.1/tcp/3048");
    }

    #[test]
    fn test_parse_ipv6_address() {
        let address = PeerAddress::parse("/ipv6/::1/tcp/3000").unwrap();
        assert_eq!(address.protocol(), Protocol::IPv6);
        assert_eq!(address.to_socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_short_address_rejected() {
        assert!(matches!(
            PeerAddress::parse("/ipv4/127.0.0.1/tcp"),
            Err(ChainError::Protocol(_))
        ));
        assert!(PeerAddress::parse("/ipv4/127.0.0.1/tcp/notaport").is_err());
    }

    #[test]
    fn test_new_peer_reuses_identity() {
        let dir = TempDir::new().unwrap();
        let first = Peer::new("/ipv4/127.0.0.1/tcp/3000", dir.path()).unwrap();
        let second = Peer::new("/ipv6/::1/tcp/3001", dir.path()).unwrap();

        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(second.protocol(), Protocol::IPv6);
        assert_eq!(Peer::read_from_disk(dir.path()).unwrap(), second);
    }

    #[test]
    fn test_peer_bytes_round_trip() {
        let peer = Peer::with_public_key(b"key", "/ipv4/10.0.0.2/tcp/4000").unwrap();
        assert_eq!(Peer::from_bytes(&peer.to_bytes().unwrap()).unwrap(), peer);
        assert_eq!(peer.id(), bs58::encode(b"key").into_string());
    }
}
