// This is the entry point for the peerchain node binary.
// Every command works on one chain under the configured data directory.
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info};
use peerchain::core::CancelToken;
use peerchain::keystore::Identity;
use peerchain::{Blockchain, ChainConfig, Command, Dht, Opt, Peer, Result, Settings, Transaction};
use std::process;

fn main() {
    let opt = Opt::parse();

    // Settings come first so the log level can come from the config file
    let settings = match Settings::load(opt.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    env_logger::Builder::new()
        .parse_filters(&settings.log_level)
        .init();

    if let Err(e) = run_command(opt.command, opt.chain, &settings) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// The chain named on the command line wins, then genesis.json, then the default
fn resolve_chain_config(chain: Option<String>, settings: &Settings) -> Result<ChainConfig> {
    let genesis_path = settings.genesis_path();
    let mut config = if genesis_path.exists() {
        ChainConfig::read_from_file(&genesis_path)?
    } else {
        ChainConfig::default()
    };
    if let Some(chain) = chain {
        config.chain = chain;
    }
    Ok(config)
}

fn run_command(command: Command, chain: Option<String>, settings: &Settings) -> Result<()> {
    let data_dir = settings.data_dir.as_path();

    match command {
        Command::Init => {
            let genesis_path = settings.genesis_path();
            if !genesis_path.exists() {
                std::fs::create_dir_all(data_dir)?;
                ChainConfig::default().write_to_file(&genesis_path)?;
                info!("Wrote default genesis to {}", genesis_path.display());
            }

            let config = resolve_chain_config(chain, settings)?;
            let blockchain = Blockchain::new(config, data_dir, &CancelToken::new())?;
            println!(
                "Created chain {} with genesis {}",
                blockchain.get_chain_id(),
                HEXLOWER.encode(blockchain.get_genesis_block().get_hash())
            );
        }
        Command::Mine { count } => {
            let config = resolve_chain_config(chain, settings)?;
            let mut blockchain = Blockchain::read_from_disk(&config.chain, data_dir)?;

            // Rewards go to the configured coinbase, or to this node's own key
            let coinbase = match settings.coinbase_bytes()? {
                Some(coinbase) => coinbase,
                None => {
                    let identity = Identity::load_or_create(&Peer::keystore_dir(data_dir))?;
                    identity.public_key().to_vec()
                }
            };
            blockchain.set_coinbase(&coinbase);

            let cancel = CancelToken::new();
            for _ in 0..count {
                let reward = Transaction::new_reward(&coinbase)?;
                let block = blockchain.mine_block(vec![reward], &cancel)?;
                println!(
                    "Mined block {} (difficulty {}, nonce {})",
                    HEXLOWER.encode(block.get_hash()),
                    block.get_difficulty(),
                    block.get_nonce()
                );
            }
            blockchain.write_to_disk()?;
        }
        Command::Printchain => {
            let config = resolve_chain_config(chain, settings)?;
            let blockchain = Blockchain::read_from_disk(&config.chain, data_dir)?;

            for block in blockchain.iter()? {
                let block = block?;
                println!("Parent hash: {}", HEXLOWER.encode(block.get_parent_hash()));
                println!("Block hash: {}", HEXLOWER.encode(block.get_hash()));
                println!("Timestamp: {}", block.get_timestamp());
                println!("Difficulty: {}", block.get_difficulty());
                println!("Nonce: {}", block.get_nonce());
                for transaction in block.get_transactions() {
                    println!(
                        "- Transaction {} -> {} value {}",
                        HEXLOWER.encode(transaction.get_hash()),
                        HEXLOWER.encode(transaction.get_recipient()),
                        transaction.get_value()
                    );
                }
                println!()
            }
        }
        Command::Identity => {
            let peer = Peer::new(&settings.node_address, data_dir)?;
            println!("Peer id: {}", peer.id());
            println!("Public key: {}", HEXLOWER.encode(peer.public_key()));
            println!("Address: {}", peer.connection_addr());
        }
        Command::Serve => {
            let config = resolve_chain_config(chain, settings)?;
            let peer = Peer::new(&settings.node_address, data_dir)?;

            let mut dht = match Dht::read_from_disk(&config.chain, data_dir) {
                Ok(dht) => dht,
                Err(_) => Dht::new(config, &peer, data_dir)?,
            };
            dht.insert_peer(&peer)?;

            let handle = dht.start_serving(peer)?;
            println!(
                "Serving chain {} on {}",
                dht.chain_id(),
                handle.local_addr()
            );
            handle.wait()?;
        }
        Command::Bootstrap { address } => {
            let config = resolve_chain_config(chain, settings)?;
            let dht = Dht::bootstrap(&address, &config.chain, &settings.node_address, data_dir)?;
            let peer = Peer::read_from_disk(data_dir)?;

            dht.join_network(&peer)?;
            println!(
                "Joined chain {} with {} known peers",
                dht.chain_id(),
                dht.len()?
            );
        }
        Command::Peers => {
            let config = resolve_chain_config(chain, settings)?;
            let dht = Dht::read_from_disk(&config.chain, data_dir)?;
            for peer in dht.peers()? {
                println!("{} {}", peer.id(), peer.connection_addr());
            }
        }
    }
    Ok(())
}
