//! Ledger integration tests
//!
//! Genesis construction, chain extension and the mempool, driven through the
//! public API only.

use peerchain::core::{Block, Blockchain, CancelToken, Operation, ProofOfWork, Transaction};
use peerchain::{ChainConfig, ChainError, Mempool};
use std::collections::BTreeMap;
use tempfile::tempdir;

fn two_account_config() -> ChainConfig {
    let mut alloc = BTreeMap::new();
    alloc.insert(hex::encode(b"account-a"), 100.0);
    alloc.insert(hex::encode(b"account-b"), 50.0);

    ChainConfig {
        alloc,
        network: 7,
        chain: "ledger_it".to_string(),
        block_interval: 10,
        difficulty: 1.0,
    }
}

fn transfer(nonce: i64) -> Transaction {
    Transaction::new(
        nonce,
        b"sender",
        b"recipient",
        1.5,
        Operation::Transfer,
        b"memo",
    )
    .unwrap()
}

#[test]
fn test_genesis_block_from_allocations() {
    let genesis =
        Blockchain::make_genesis_block(&two_account_config(), &CancelToken::new()).unwrap();

    assert_eq!(genesis.get_transactions().len(), 2);
    assert!(genesis.is_genesis());
    assert_eq!(
        genesis.get_merkle_root(),
        Block::hash_transaction_sum(genesis.get_transactions()).as_slice()
    );
    assert!(ProofOfWork::validate(&genesis).unwrap());
    assert!(genesis.verify_hash().unwrap());

    let values: Vec<f64> = genesis
        .get_transactions()
        .iter()
        .map(|tx| tx.get_value())
        .collect();
    assert_eq!(values, vec![100.0, 50.0]);
}

#[test]
fn test_mine_three_blocks_and_reopen() {
    let dir = tempdir().unwrap();
    let config = two_account_config();
    let cancel = CancelToken::new();

    let mut blockchain = Blockchain::new(config.clone(), dir.path(), &cancel).unwrap();
    blockchain.set_coinbase(b"miner");

    let mut mined = vec![];
    for nonce in 0..3 {
        let block = blockchain.mine_block(vec![transfer(nonce)], &cancel).unwrap();
        assert_eq!(blockchain.get_head_hash(), block.get_hash());
        mined.push(block.get_hash().to_vec());
    }
    let total_difficulty = blockchain.get_total_difficulty();
    blockchain.write_to_disk().unwrap();
    drop(blockchain);

    let reopened = Blockchain::read_from_disk(&config.chain, dir.path()).unwrap();
    assert_eq!(reopened.get_head_hash(), mined[2].as_slice());
    assert_eq!(reopened.get_total_difficulty(), total_difficulty);

    let walked: Vec<Block> = reopened.iter().unwrap().map(|b| b.unwrap()).collect();
    assert_eq!(walked.len(), 4);
    assert_eq!(walked[0].get_hash(), mined[2].as_slice());
    assert_eq!(walked[1].get_hash(), mined[1].as_slice());
    assert_eq!(walked[2].get_hash(), mined[0].as_slice());
    assert!(walked[3].is_genesis());
    for pair in walked.windows(2) {
        assert_eq!(pair[0].get_parent_hash(), pair[1].get_hash());
        assert!(pair[0].get_timestamp() > pair[1].get_timestamp());
    }
}

#[test]
fn test_add_block_requires_current_head_as_parent() {
    let dir = tempdir().unwrap();
    let cancel = CancelToken::new();
    let mut blockchain = Blockchain::new(two_account_config(), dir.path(), &cancel).unwrap();
    let genesis = blockchain.get_last_block().unwrap();

    let mut first = blockchain
        .create_new_block(&genesis, vec![transfer(1)], 0)
        .unwrap();
    ProofOfWork::mine(&mut first, &genesis, &cancel, None).unwrap();
    let mut sibling = blockchain
        .create_new_block(&genesis, vec![transfer(2)], 0)
        .unwrap();
    ProofOfWork::mine(&mut sibling, &genesis, &cancel, None).unwrap();

    blockchain.add_block(&first).unwrap();
    let result = blockchain.add_block(&sibling);
    assert!(matches!(result, Err(ChainError::InvalidBlock(_))));
    assert_eq!(blockchain.get_head_hash(), first.get_hash());
    assert!(blockchain.get_block(sibling.get_hash()).unwrap().is_none());
}

#[test]
fn test_add_block_with_closed_store() {
    let dir = tempdir().unwrap();
    let cancel = CancelToken::new();
    let mut blockchain = Blockchain::new(two_account_config(), dir.path(), &cancel).unwrap();
    let genesis = blockchain.get_last_block().unwrap();

    let mut block = blockchain
        .create_new_block(&genesis, vec![transfer(1)], 0)
        .unwrap();
    ProofOfWork::mine(&mut block, &genesis, &cancel, None).unwrap();

    blockchain.close_store().unwrap();
    assert!(matches!(
        blockchain.add_block(&block),
        Err(ChainError::StoreClosed)
    ));

    blockchain.open_store().unwrap();
    blockchain.add_block(&block).unwrap();
}

#[test]
fn test_mempool_query_and_remove() {
    let founding = transfer(0);
    let mut mempool = Mempool::new(founding.clone());
    let pending = transfer(1);

    mempool.add_transaction(pending.clone());
    assert_eq!(mempool.query_transaction(pending.get_hash()), Some(1));

    let absent = transfer(99);
    assert!(mempool.remove_transaction(absent.get_hash()).is_none());
    assert_eq!(mempool.len(), 2);

    assert!(mempool.remove_transaction(pending.get_hash()).is_some());
    assert_eq!(mempool.len(), 1);
    assert_eq!(mempool.query_transaction(pending.get_hash()), None);
    assert_eq!(mempool.query_transaction(founding.get_hash()), Some(0));
}

#[test]
fn test_mine_pending_drains_mined_transactions() {
    let dir = tempdir().unwrap();
    let cancel = CancelToken::new();
    let mut blockchain = Blockchain::new(two_account_config(), dir.path(), &cancel).unwrap();

    let mut mempool = Mempool::new(transfer(0));
    mempool.add_transaction(transfer(1));
    mempool.add_transaction(transfer(2));

    let block = blockchain.mine_pending(&mut mempool, 2, &cancel).unwrap();
    assert_eq!(block.get_transactions().len(), 2);
    assert_eq!(mempool.len(), 1);
    assert_eq!(mempool.transactions()[0].get_account_nonce(), 2);
}
