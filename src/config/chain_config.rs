use crate::core::DifficultyAdjustment;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Chain-level parameters, stored as the `genesis.json` file.
///
/// `alloc` maps hex-encoded recipient public keys to their starting balance.
/// Being a `BTreeMap`, it iterates in key order, so every node that reads the
/// same file builds its genesis transactions in the same order.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct ChainConfig {
    pub alloc: BTreeMap<String, f64>,
    pub network: i32,
    pub chain: String,
    /// Desired seconds between blocks
    pub block_interval: i64,
    pub difficulty: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            alloc: BTreeMap::new(),
            network: 0,
            chain: "gitchain_testnet".to_string(),
            block_interval: 10,
            difficulty: 1.0,
        }
    }
}

impl ChainConfig {
    pub fn read_from_file(path: &Path) -> Result<ChainConfig> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ChainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: ChainConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.is_empty() {
            return Err(ChainError::Config("Chain id must not be empty".to_string()));
        }
        let path_like = self.chain.contains(|c: char| c == '/' || c == '\\');
        if path_like || self.chain == "." || self.chain == ".." {
            return Err(ChainError::Config(format!(
                "Chain id {} is not a valid directory name",
                self.chain
            )));
        }
        if self.block_interval <= 0 {
            return Err(ChainError::Config(format!(
                "Block interval must be positive, got {}",
                self.block_interval
            )));
        }
        DifficultyAdjustment::validate_difficulty(self.difficulty)?;
        for (recipient, amount) in &self.alloc {
            if !amount.is_finite() {
                return Err(ChainError::Config(format!(
                    "Allocation for {recipient} is not finite"
                )));
            }
        }
        Ok(())
    }

    /// Decoded `(recipient, amount)` pairs in key order.
    pub fn alloc_entries(&self) -> Result<Vec<(Vec<u8>, f64)>> {
        self.alloc
            .iter()
            .map(|(recipient, amount)| Ok((hex::decode(recipient)?, *amount)))
            .collect()
    }
}
