// Sled-backed DHT peer table: public key -> serialized peer record.
// Handles are cheap to clone and share the same underlying database.

use crate::error::{ChainError, Result};
use crate::storage::database::open_database;
use log::debug;
use sled::{Batch, Db, Tree};
use std::path::Path;

const PEERS_TREE: &str = "peers";

#[derive(Clone)]
pub struct PeerTable {
    db: Db,
    peers: Tree,
}

impl PeerTable {
    pub fn open(path: &Path) -> Result<PeerTable> {
        let db = open_database(path)?;
        let peers = db
            .open_tree(PEERS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open peers tree: {e}")))?;

        debug!("Opened peer table at {}", path.display());
        Ok(PeerTable { db, peers })
    }

    /// Insert or overwrite a peer record.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.peers
            .insert(key, value)
            .map_err(|e| ChainError::Database(format!("Failed to insert peer: {e}")))?;
        Ok(())
    }

    /// Insert every pair atomically: either all of them land or none do.
    pub fn insert_all(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut batch = Batch::default();
        for (key, value) in entries {
            batch.insert(key, value);
        }
        self.peers
            .apply_batch(batch)
            .map_err(|e| ChainError::Database(format!("Failed to insert peers: {e}")))?;
        Ok(())
    }

    /// Insert only when `key` is unknown. Returns whether the record was added.
    ///
    /// The check and the write are a single compare-and-swap, so concurrent joins
    /// of the same peer add it exactly once.
    pub fn insert_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let swapped = self
            .peers
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| ChainError::Database(format!("Failed to insert peer: {e}")))?;
        Ok(swapped.is_ok())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .peers
            .get(key)
            .map_err(|e| ChainError::Database(format!("Failed to get peer: {e}")))?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.peers
            .contains_key(key)
            .map_err(|e| ChainError::Database(format!("Failed to check peer existence: {e}")))
    }

    /// Every `(key, value)` pair in key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = vec![];
        for item in self.peers.iter() {
            let (key, value) =
                item.map_err(|e| ChainError::Database(format!("Failed to read peer: {e}")))?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ChainError::Database(format!("Failed to flush peer table: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_if_absent_adds_once() {
        let dir = TempDir::new().unwrap();
        let table = PeerTable::open(dir.path()).unwrap();

        assert!(table.insert_if_absent(b"key", b"first").unwrap());
        assert!(!table.insert_if_absent(b"key", b"second").unwrap());

        assert_eq!(table.get(b"key").unwrap(), Some(b"first".to_vec()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_all_writes_every_pair() {
        let dir = TempDir::new().unwrap();
        let table = PeerTable::open(dir.path()).unwrap();
        assert!(table.is_empty());

        table
            .insert_all(vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_entries_in_key_order() {
        let dir = TempDir::new().unwrap();
        let table = PeerTable::open(dir.path()).unwrap();
        table.insert(b"b", b"2").unwrap();
        table.insert(b"a", b"1").unwrap();

        let entries = table.entries().unwrap();
        assert_eq!(
            entries,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn test_clones_share_state() {
        let dir = TempDir::new().unwrap();
        let table = PeerTable::open(dir.path()).unwrap();
        let shared = table.clone();

        shared.insert(b"peer", b"record").unwrap();
        assert!(table.contains(b"peer").unwrap());
    }
}
