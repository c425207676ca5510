use crate::error::{ChainError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_DATA_DIR: &str = "./data";
static DEFAULT_NODE_ADDRESS: &str = "/ipv4/127.0.0.1/tcp/3000";
static DEFAULT_LOG_LEVEL: &str = "info";

const DATA_DIR_KEY: &str = "PEERCHAIN_DATA_DIR";
const NODE_ADDRESS_KEY: &str = "PEERCHAIN_NODE_ADDRESS";
const LOG_LEVEL_KEY: &str = "PEERCHAIN_LOG";

/// Node-level settings, read from an optional TOML file and then the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of every store, header and keystore file
    pub data_dir: PathBuf,
    /// Address this node serves on, e.g. `/ipv4/127.0.0.1/tcp/3000`
    pub node_address: String,
    pub log_level: String,
    /// Hex public key credited by mined blocks; empty means the node identity
    pub coinbase: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_address: DEFAULT_NODE_ADDRESS.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            coinbase: String::new(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ChainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let settings: Settings = toml::from_str(&contents)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(data_dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(node_address) = env::var(NODE_ADDRESS_KEY) {
            self.node_address = node_address;
        }
        if let Ok(log_level) = env::var(LOG_LEVEL_KEY) {
            self.log_level = log_level;
        }
    }

    /// Decoded coinbase key, or `None` when unset.
    pub fn coinbase_bytes(&self) -> Result<Option<Vec<u8>>> {
        if self.coinbase.is_empty() {
            return Ok(None);
        }
        Ok(Some(hex::decode(&self.coinbase)?))
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.data_dir.join("genesis.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "node_address = \"/ipv4/10.0.0.1/tcp/4000\"\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.node_address, "/ipv4/10.0.0.1/tcp/4000");
        assert_eq!(settings.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(settings.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "node_address = [").unwrap();

        assert!(matches!(
            Settings::from_file(&path),
            Err(ChainError::Config(_))
        ));
    }

    #[test]
    fn test_coinbase_bytes() {
        let mut settings = Settings::default();
        assert_eq!(settings.coinbase_bytes().unwrap(), None);

        settings.coinbase = "0a0b".to_string();
        assert_eq!(settings.coinbase_bytes().unwrap(), Some(vec![0x0a, 0x0b]));

        settings.coinbase = "zz".to_string();
        assert!(settings.coinbase_bytes().is_err());
    }
}
