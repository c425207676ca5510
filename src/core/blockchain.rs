// This is the ledger: one append-only chain of proof-of-work blocks per chain id.
// Blocks live in a sled store keyed by hash, and I keep an explicit head pointer
// next to them so the tip never depends on how sled orders the hash keys.
// Everything that is not a block (config, genesis, chain id, totals) goes into a
// small JSON header file beside the store.

use crate::config::ChainConfig;
use crate::core::{Block, CancelToken, DifficultyAdjustment, ProofOfWork, Transaction};
use crate::error::{ChainError, Result};
use crate::storage::{BlockStore, Mempool};
use crate::utils::current_timestamp;
use data_encoding::HEXLOWER;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Layout under the data directory: db/<chain>/{store, db_header.json}
const DB_DIR: &str = "db";
const STORE_DIR: &str = "store";
const HEADER_FILE: &str = "db_header.json";

/// Everything about a chain that is not a block, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainHeader {
    pub genesis_block: Block,
    pub config: ChainConfig,
    pub chain_id: String,
    pub network_id: i32,
    pub total_difficulty: f64,
    /// Hex hash of the head block when the header was written
    pub head_hash: String,
}

pub struct Blockchain {
    genesis_block: Block,
    config: ChainConfig,
    chain_id: String,
    network_id: i32,
    total_difficulty: f64,
    head_hash: Vec<u8>,
    coinbase: Vec<u8>,         // Credited by blocks this node mines
    data_dir: PathBuf,
    store: Option<BlockStore>, // None while the header is being written
}

impl Blockchain {
    // When I create a brand new chain I mine its genesis block and persist it right away
    pub fn new(config: ChainConfig, data_dir: &Path, cancel: &CancelToken) -> Result<Blockchain> {
        config.validate()?;
        let chain_dir = Self::chain_dir(data_dir, &config.chain);

        let store = BlockStore::open(&chain_dir.join(STORE_DIR))?;
        if store.head_hash()?.is_some() {
            return Err(ChainError::Database(format!(
                "Chain {} already exists at {}",
                config.chain,
                chain_dir.display()
            )));
        }

        let genesis_block = Self::make_genesis_block(&config, cancel)?;
        let total_difficulty = genesis_block.get_difficulty();

        let mut blockchain = Blockchain {
            head_hash: genesis_block.get_hash().to_vec(),
            genesis_block,
            chain_id: config.chain.clone(),
            network_id: config.network,
            config,
            total_difficulty,
            coinbase: vec![],
            data_dir: data_dir.to_path_buf(),
            store: Some(store),
        };
        // Header first: a store with a head but no header could never be reopened
        blockchain.write_to_disk()?;
        blockchain
            .store()?
            .append(&blockchain.genesis_block, total_difficulty)?;

        info!(
            "Created chain {} with genesis block {}",
            blockchain.chain_id,
            HEXLOWER.encode(blockchain.genesis_block.get_hash())
        );
        Ok(blockchain)
    }

    /// Build and mine the genesis block for `config`.
    ///
    /// One allocation transaction per `alloc` entry, in key order. Retargeting runs
    /// against an empty anchor block carrying the configured difficulty.
    pub fn make_genesis_block(config: &ChainConfig, cancel: &CancelToken) -> Result<Block> {
        let difficulty = DifficultyAdjustment::initial_difficulty(config.difficulty);

        let mut transactions = vec![];
        for (recipient, amount) in config.alloc_entries()? {
            transactions.push(Transaction::new_allocation(&recipient, amount)?);
        }

        let now = current_timestamp()?;
        let anchor = Block::new(vec![], &[], &[], difficulty, 0, now)?;
        let mut genesis_block = Block::new(transactions, &[], &[], difficulty, 0, now)?;

        ProofOfWork::mine(&mut genesis_block, &anchor, cancel, None)?;
        Ok(genesis_block)
    }

    // Reopen a chain I created earlier. The store is the source of truth for the
    // head and total difficulty; the header only supplies the rest.
    pub fn read_from_disk(chain_id: &str, data_dir: &Path) -> Result<Blockchain> {
        let chain_dir = Self::chain_dir(data_dir, chain_id);
        let contents = fs::read_to_string(chain_dir.join(HEADER_FILE)).map_err(|e| {
            ChainError::Io(format!("Failed to read header for chain {chain_id}: {e}"))
        })?;
        let header: ChainHeader = serde_json::from_str(&contents)?;

        let store = BlockStore::open(&chain_dir.join(STORE_DIR))?;
        let head_hash = match store.head_hash()? {
            Some(head_hash) => head_hash,
            None => HEXLOWER
                .decode(header.head_hash.as_bytes())
                .map_err(|e| ChainError::Serialization(format!("Invalid head hash: {e}")))?,
        };
        if HEXLOWER.encode(&head_hash) != header.head_hash {
            warn!("Header for chain {chain_id} is behind the block store, using the store head");
        }
        let total_difficulty = store
            .total_difficulty()?
            .unwrap_or(header.total_difficulty);

        Ok(Blockchain {
            genesis_block: header.genesis_block,
            config: header.config,
            chain_id: header.chain_id,
            network_id: header.network_id,
            total_difficulty,
            head_hash,
            coinbase: vec![],
            data_dir: data_dir.to_path_buf(),
            store: Some(store),
        })
    }

    /// Persist the header. The store is closed while the header is written and
    /// reopened afterwards, even when writing fails.
    pub fn write_to_disk(&mut self) -> Result<()> {
        self.close_store()?;
        let written = self.write_header();
        self.open_store()?;
        written
    }

    fn write_header(&self) -> Result<()> {
        let chain_dir = Self::chain_dir(&self.data_dir, &self.chain_id);
        fs::create_dir_all(&chain_dir)?;

        let header = ChainHeader {
            genesis_block: self.genesis_block.clone(),
            config: self.config.clone(),
            chain_id: self.chain_id.clone(),
            network_id: self.network_id,
            total_difficulty: self.total_difficulty,
            head_hash: HEXLOWER.encode(&self.head_hash),
        };
        fs::write(
            chain_dir.join(HEADER_FILE),
            serde_json::to_string_pretty(&header)?,
        )?;
        Ok(())
    }

    pub fn open_store(&mut self) -> Result<()> {
        if self.store.is_none() {
            let path = Self::chain_dir(&self.data_dir, &self.chain_id).join(STORE_DIR);
            self.store = Some(BlockStore::open(&path)?);
        }
        Ok(())
    }

    pub fn close_store(&mut self) -> Result<()> {
        if let Some(store) = self.store.take() {
            store.flush()?;
        }
        Ok(())
    }

    pub fn is_store_open(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&BlockStore> {
        self.store.as_ref().ok_or(ChainError::StoreClosed)
    }

    /// Append a sealed block to the head of the chain.
    ///
    /// Rejected with `StoreClosed` when the store is closed and with `InvalidBlock`
    /// when the nonce misses its target, the hash is stale, or the block does not
    /// extend the current head. The head only moves on success.
    pub fn add_block(&mut self, block: &Block) -> Result<()> {
        let store = self.store()?;

        if !ProofOfWork::validate(block)? {
            return Err(ChainError::InvalidBlock(format!(
                "Nonce {} does not meet the target for difficulty {}",
                block.get_nonce(),
                block.get_difficulty()
            )));
        }
        if !block.verify_hash()? {
            return Err(ChainError::InvalidBlock(
                "Block hash does not match its contents".to_string(),
            ));
        }
        if block.get_parent_hash() != self.head_hash.as_slice() {
            return Err(ChainError::InvalidBlock(format!(
                "Parent {} is not the current head {}",
                HEXLOWER.encode(block.get_parent_hash()),
                HEXLOWER.encode(&self.head_hash)
            )));
        }

        let total_difficulty = self.total_difficulty + block.get_difficulty();
        store.append(block, total_difficulty)?;

        self.total_difficulty = total_difficulty;
        self.head_hash = block.get_hash().to_vec();
        info!(
            "Appended block {} to chain {} (difficulty: {})",
            HEXLOWER.encode(block.get_hash()),
            self.chain_id,
            block.get_difficulty()
        );
        Ok(())
    }

    /// The block the head pointer names.
    pub fn get_last_block(&self) -> Result<Block> {
        self.store()?.get_block(&self.head_hash)?.ok_or_else(|| {
            ChainError::Database(format!(
                "Head block {} is missing from the store",
                HEXLOWER.encode(&self.head_hash)
            ))
        })
    }

    /// Unsealed candidate on top of `parent`. The caller drives the mining loop.
    pub fn create_new_block(
        &self,
        parent: &Block,
        transactions: Vec<Transaction>,
        nonce: u64,
    ) -> Result<Block> {
        let timestamp = current_timestamp()?.max(parent.get_timestamp() + 1);
        let difficulty = DifficultyAdjustment::calculate_difficulty(parent, timestamp);

        Block::new(
            transactions,
            parent.get_hash(),
            &self.coinbase,
            difficulty,
            nonce,
            timestamp,
        )
    }

    // Candidate, mine, append. The caller runs this off any request-handling thread.
    pub fn mine_block(
        &mut self,
        transactions: Vec<Transaction>,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let parent = self.get_last_block()?;
        let mut block = self.create_new_block(&parent, transactions, 0)?;

        info!(
            "Mining block with {} transactions on top of {}",
            block.get_transactions().len(),
            HEXLOWER.encode(parent.get_hash())
        );
        ProofOfWork::mine(&mut block, &parent, cancel, None)?;
        self.add_block(&block)?;
        Ok(block)
    }

    /// Mine up to `max` pending transactions, oldest first. They leave the mempool
    /// only once the block is on the chain.
    pub fn mine_pending(
        &mut self,
        mempool: &mut Mempool,
        max: usize,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let take = max.min(mempool.len());
        let transactions = mempool.transactions()[..take].to_vec();

        let block = self.mine_block(transactions, cancel)?;
        for transaction in block.get_transactions() {
            mempool.remove_transaction(transaction.get_hash());
        }
        Ok(block)
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        self.store()?.get_block(block_hash)
    }

    /// Walk from the head back to genesis through parent hashes.
    pub fn iter(&self) -> Result<BlockchainIterator<'_>> {
        Ok(BlockchainIterator {
            store: self.store()?,
            current_hash: Some(self.head_hash.clone()),
        })
    }

    pub fn set_coinbase(&mut self, coinbase: &[u8]) {
        self.coinbase = coinbase.to_vec();
    }

    pub fn get_coinbase(&self) -> &[u8] {
        &self.coinbase
    }

    pub fn get_genesis_block(&self) -> &Block {
        &self.genesis_block
    }

    pub fn get_config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn get_chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn get_network_id(&self) -> i32 {
        self.network_id
    }

    pub fn get_total_difficulty(&self) -> f64 {
        self.total_difficulty
    }

    pub fn get_head_hash(&self) -> &[u8] {
        &self.head_hash
    }

    pub fn chain_dir(data_dir: &Path, chain_id: &str) -> PathBuf {
        data_dir.join(DB_DIR).join(chain_id)
    }
}

pub struct BlockchainIterator<'a> {
    store: &'a BlockStore,
    current_hash: Option<Vec<u8>>,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;

        match self.store.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.current_hash = Some(block.get_parent_hash().to_vec());
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::Database(format!(
                "Block {} is missing from the store",
                HEXLOWER.encode(&hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
