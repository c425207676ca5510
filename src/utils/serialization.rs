// Bincode helpers shared by blocks, transactions and wire frames
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on bytes a single decode may claim. Length prefixes beyond it are
/// rejected before anything is allocated.
pub const DECODE_LIMIT: usize = 4 * 1024 * 1024;

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    encode(data)
}

/// Encode any bincode value, including tuples of borrowed fields
pub fn encode<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| ChainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration, capped at
/// [`DECODE_LIMIT`] bytes
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard().with_limit::<DECODE_LIMIT>();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| ChainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}
