//! Error handling for the ledger and the peer table protocol
//!
//! Every fallible operation in the crate returns [`Result`], so callers can tell an
//! I/O failure apart from a rejected block or a protocol violation.

use std::fmt;

/// Result type alias for ledger and DHT operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Error types for ledger, mempool and DHT operations
#[derive(Debug, Clone)]
pub enum ChainError {
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// The remote side violated the wire protocol (bad frame, wrong recipient, bad address)
    Protocol(String),
    /// Transaction construction or signing errors
    Transaction(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Block validation errors
    InvalidBlock(String),
    /// A block was offered while the block store was closed
    StoreClosed,
    /// Mining was cancelled or ran out of nonce space
    Mining(String),
    /// Unrecoverable configuration state, such as an infinite difficulty
    Fatal(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Database(msg) => write!(f, "Database error: {msg}"),
            ChainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            ChainError::Network(msg) => write!(f, "Network error: {msg}"),
            ChainError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            ChainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            ChainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            ChainError::Io(msg) => write!(f, "I/O error: {msg}"),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            ChainError::StoreClosed => write!(f, "Block store is not open"),
            ChainError::Mining(msg) => write!(f, "Mining error: {msg}"),
            ChainError::Fatal(msg) => write!(f, "Fatal error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

impl From<secp256k1::Error> for ChainError {
    fn from(err: secp256k1::Error) -> Self {
        ChainError::Crypto(err.to_string())
    }
}

impl From<hex::FromHexError> for ChainError {
    fn from(err: hex::FromHexError) -> Self {
        ChainError::Serialization(format!("Invalid hex: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: ChainError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ChainError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: gone");
    }

    #[test]
    fn test_store_closed_display() {
        assert_eq!(ChainError::StoreClosed.to_string(), "Block store is not open");
    }
}
