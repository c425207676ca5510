// Wire envelopes for the DHT protocol and the framing that carries them.
// Every frame is a big-endian u32 length followed by that many bytes of bincode.

use crate::error::{ChainError, Result};
use crate::network::{Peer, PeerAddress};
use crate::utils::{deserialize, serialize, DECODE_LIMIT};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

pub const MAX_FRAME_LEN: usize = DECODE_LIMIT;
pub const TCP_WRITE_TIMEOUT: u64 = 5000;
pub const TCP_READ_TIMEOUT: u64 = 60_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum ConnectionType {
    /// meta: [chain id]
    DhtBootstrapRequest,
    /// meta: [chain id, peer record]
    PeerJoinRequest,
}

/// Request envelope: one per TCP connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Connection {
    connection_type: ConnectionType,
    meta: Vec<Vec<u8>>,
    sender_public_key: Vec<u8>,
    recipient_address: String,
}

impl Connection {
    pub fn new(
        connection_type: ConnectionType,
        meta: Vec<Vec<u8>>,
        sender_public_key: &[u8],
        recipient_address: &str,
    ) -> Connection {
        Connection {
            connection_type,
            meta,
            sender_public_key: sender_public_key.to_vec(),
            recipient_address: recipient_address.to_string(),
        }
    }

    /// Send a `Close` event and shut the stream, but only when `local` is the
    /// peer this request was addressed to. A mismatch is a protocol error and
    /// leaves the stream untouched.
    pub fn close_from_receiver(&self, local: &Peer, stream: &mut TcpStream) -> Result<()> {
        if local.connection_addr() != self.recipient_address {
            warn!(
                "Refusing to close connection addressed to {} from {}",
                self.recipient_address,
                local.connection_addr()
            );
            return Err(ChainError::Protocol(format!(
                "Connection was addressed to {}, not {}",
                self.recipient_address,
                local.connection_addr()
            )));
        }

        write_frame(stream, &ConnectionEvent::close().serialize()?)?;
        stream.shutdown(Shutdown::Both)?;
        Ok(())
    }

    /// Copy of this request addressed to someone else.
    pub fn readdressed(&self, recipient_address: &str) -> Connection {
        Connection {
            recipient_address: recipient_address.to_string(),
            ..self.clone()
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Connection> {
        deserialize::<Connection>(bytes)
    }

    pub fn get_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn get_meta(&self) -> &[Vec<u8>] {
        &self.meta
    }

    pub fn get_sender_public_key(&self) -> &[u8] {
        &self.sender_public_key
    }

    pub fn get_recipient_address(&self) -> &str {
        &self.recipient_address
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum ConnectionEventType {
    Close,
    Response,
}

/// Server-to-client event. A `Response` carries one `[key, value]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ConnectionEvent {
    event_type: ConnectionEventType,
    meta: Vec<Vec<u8>>,
}

impl ConnectionEvent {
    pub fn new(event_type: ConnectionEventType, meta: Vec<Vec<u8>>) -> ConnectionEvent {
        ConnectionEvent { event_type, meta }
    }

    pub fn response(key: &[u8], value: &[u8]) -> ConnectionEvent {
        Self::new(
            ConnectionEventType::Response,
            vec![key.to_vec(), value.to_vec()],
        )
    }

    pub fn close() -> ConnectionEvent {
        Self::new(ConnectionEventType::Close, vec![])
    }

    /// The `(key, value)` pair of a well-formed response.
    pub fn key_value(&self) -> Option<(&[u8], &[u8])> {
        match (self.event_type, self.meta.as_slice()) {
            (ConnectionEventType::Response, [key, value, ..]) => {
                Some((key.as_slice(), value.as_slice()))
            }
            _ => None,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<ConnectionEvent> {
        deserialize::<ConnectionEvent>(bytes)
    }

    pub fn get_type(&self) -> ConnectionEventType {
        self.event_type
    }

    pub fn get_meta(&self) -> &[Vec<u8>] {
        &self.meta
    }
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ChainError::Protocol(format!(
            "Frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
            payload.len()
        )));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly between
/// frames; EOF inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ChainError::Protocol(
                    "Stream ended inside a frame header".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ChainError::Protocol(format!(
            "Frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        ChainError::Protocol(format!("Stream ended inside a {len} byte frame: {e}"))
    })?;
    Ok(Some(payload))
}

/// Open a stream to a peer address with connect, read and write timeouts set.
pub fn connect(address: &str) -> Result<TcpStream> {
    let socket_addr = PeerAddress::parse(address)?.to_socket_addr()?;

    let stream =
        TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
            .map_err(|e| ChainError::Network(format!("Failed to connect to {address}: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| ChainError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
        .map_err(|e| ChainError::Network(format!("Failed to set read timeout: {e}")))?;

    Ok(stream)
}

/// Connect to `address` and write `connection` as the opening frame.
pub fn send_connection(address: &str, connection: &Connection) -> Result<TcpStream> {
    debug!("Sending {:?} to {address}", connection.get_type());

    let mut stream = connect(address)?;
    write_frame(&mut stream, &connection.serialize()?)?;
    Ok(stream)
}
