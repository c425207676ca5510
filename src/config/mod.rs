//! Configuration management
//!
//! Node settings (data directory, serving address, log level, coinbase) and the
//! per-chain genesis configuration.

pub mod chain_config;
pub mod settings;

pub use chain_config::ChainConfig;
pub use settings::Settings;
