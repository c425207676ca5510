//! Test utilities for ledger and DHT testing

use crate::config::ChainConfig;
use crate::core::{Blockchain, CancelToken, ProofOfWork};
use crate::error::{ChainError, Result};
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| ChainError::Io(e.to_string()))
}

/// Chain config with difficulty 1.0, so half of all nonces are valid
pub fn test_chain_config() -> ChainConfig {
    let mut alloc = BTreeMap::new();
    alloc.insert(hex::encode(b"alice"), 100.0);
    alloc.insert(hex::encode(b"bob"), 50.0);

    ChainConfig {
        alloc,
        network: 1,
        chain: "test_chain".to_string(),
        block_interval: 10,
        difficulty: 1.0,
    }
}

/// Create a test blockchain with temporary storage
pub fn create_test_blockchain() -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let blockchain = Blockchain::new(test_chain_config(), temp_dir.path(), &CancelToken::new())?;
    Ok((blockchain, temp_dir))
}

/// Validate blockchain integrity from head to genesis
pub fn validate_blockchain_integrity(blockchain: &Blockchain) -> Result<bool> {
    let mut expected_hash = blockchain.get_head_hash().to_vec();

    for block in blockchain.iter()? {
        let block = block?;

        // Check block linkage
        if block.get_hash() != expected_hash.as_slice() {
            return Ok(false);
        }

        // Validate proof of work
        if !ProofOfWork::validate(&block)? {
            return Ok(false);
        }

        if !block.verify_merkle_root() || !block.verify_hash()? {
            return Ok(false);
        }

        expected_hash = block.get_parent_hash().to_vec();
    }

    Ok(expected_hash.is_empty())
}

/// Peer address on a port the OS just reported free
pub fn free_address() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    Ok(format!("/ipv4/127.0.0.1/tcp/{port}"))
}

/// Poll `condition` every 20ms until it holds or `timeout` passes
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        assert_eq!(blockchain.iter().unwrap().count(), 1);
    }

    #[test]
    fn test_validate_blockchain_integrity() {
        let (mut blockchain, _temp_dir) = create_test_blockchain().unwrap();
        blockchain.mine_block(vec![], &CancelToken::new()).unwrap();
        blockchain.mine_block(vec![], &CancelToken::new()).unwrap();

        assert!(validate_blockchain_integrity(&blockchain).unwrap());
    }

    #[test]
    fn test_free_addresses_parse() {
        let address = free_address().unwrap();
        assert!(address.starts_with("/ipv4/127.0.0.1/tcp/"));
    }
}
