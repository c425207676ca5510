use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "peerchain", about = "Proof-of-work ledger node with DHT peer discovery")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "Path to a TOML settings file"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long = "chain",
        global = true,
        help = "Chain id to operate on (defaults to the id in genesis.json)"
    )]
    pub chain: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "init", about = "Create a chain from genesis.json")]
    Init,
    #[command(name = "mine", about = "Mine blocks carrying a coinbase reward")]
    Mine {
        #[arg(long = "count", default_value_t = 1, help = "Number of blocks to mine")]
        count: usize,
    },
    #[command(name = "printchain", about = "Print all blocks from head to genesis")]
    Printchain,
    #[command(name = "identity", about = "Print this node's public key and peer id")]
    Identity,
    #[command(name = "serve", about = "Serve the chain's peer table until stopped")]
    Serve,
    #[command(
        name = "bootstrap",
        about = "Copy the peer table from a remote node, then join the network"
    )]
    Bootstrap {
        #[arg(help = "Remote address, e.g. /ipv4/127.0.0.1/tcp/3048")]
        address: String,
    },
    #[command(name = "peers", about = "List the peers known for the chain")]
    Peers,
}
