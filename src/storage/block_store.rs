// Sled-backed block storage. Blocks are keyed by hash in one tree; the current
// head lives in a second tree so the tip never depends on key order.

use crate::core::Block;
use crate::error::{ChainError, Result};
use crate::storage::database::open_database;
use log::debug;
use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};
use std::path::Path;

const BLOCKS_TREE: &str = "blocks"; // hash -> encoded block
const CHAIN_META_TREE: &str = "chain_meta"; // bookkeeping keys
const HEAD_BLOCK_HASH_KEY: &str = "head_block_hash";
const TOTAL_DIFFICULTY_KEY: &str = "total_difficulty";

pub struct BlockStore {
    db: Db,
    blocks: Tree,
    meta: Tree,
}

impl BlockStore {
    pub fn open(path: &Path) -> Result<BlockStore> {
        let db = open_database(path)?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let meta = db
            .open_tree(CHAIN_META_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open chain meta tree: {e}")))?;

        debug!("Opened block store at {}", path.display());
        Ok(BlockStore { db, blocks, meta })
    }

    /// Store a block, move the head pointer to it and record the new total
    /// difficulty, all in one transaction.
    pub fn append(&self, block: &Block, total_difficulty: f64) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;
        let total = total_difficulty.to_be_bytes();

        (&self.blocks, &self.meta)
            .transaction(|(blocks, meta)| {
                blocks.insert(block_hash, block_data.as_slice())?;
                meta.insert(HEAD_BLOCK_HASH_KEY, block_hash)?;
                meta.insert(TOTAL_DIFFICULTY_KEY, &total[..])?;
                Ok(())
            })
            .map_err(|e: TransactionError| {
                ChainError::Database(format!("Failed to append block: {e}"))
            })?;

        Ok(())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self
            .blocks
            .get(block_hash)
            .map_err(|e| ChainError::Database(format!("Failed to get block: {e}")))?
        {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn head_hash(&self) -> Result<Option<Vec<u8>>> {
        let head = self
            .meta
            .get(HEAD_BLOCK_HASH_KEY)
            .map_err(|e| ChainError::Database(format!("Failed to get head hash: {e}")))?;
        Ok(head.map(|bytes| bytes.to_vec()))
    }

    pub fn total_difficulty(&self) -> Result<Option<f64>> {
        let total = self
            .meta
            .get(TOTAL_DIFFICULTY_KEY)
            .map_err(|e| ChainError::Database(format!("Failed to get total difficulty: {e}")))?;

        match total {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    ChainError::Database("Corrupt total difficulty record".to_string())
                })?;
                Ok(Some(f64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ChainError::Database(format!("Failed to flush block store: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn block(parent: &[u8], timestamp: i64) -> Block {
        Block::new(vec![], parent, b"miner", 1.0, 0, timestamp).unwrap()
    }

    #[test]
    fn test_append_moves_head() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        assert_eq!(store.head_hash().unwrap(), None);

        let first = block(&[], 1);
        let second = block(first.get_hash(), 2);
        store.append(&first, 1.0).unwrap();
        store.append(&second, 2.0).unwrap();

        assert_eq!(store.head_hash().unwrap(), Some(second.get_hash().to_vec()));
        assert_eq!(store.total_difficulty().unwrap(), Some(2.0));
        assert_eq!(store.get_block(first.get_hash()).unwrap(), Some(first));
        assert_eq!(store.get_block(second.get_hash()).unwrap(), Some(second));
    }

    #[test]
    fn test_head_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let head = block(&[], 1);
        {
            let store = BlockStore::open(dir.path()).unwrap();
            store.append(&head, 1.0).unwrap();
            store.flush().unwrap();
        }

        let store = BlockStore::open(dir.path()).unwrap();
        assert_eq!(store.head_hash().unwrap(), Some(head.get_hash().to_vec()));
    }
}
