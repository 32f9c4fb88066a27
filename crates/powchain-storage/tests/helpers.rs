#![allow(dead_code)]

use powchain_core::{genesis_block, Block, Chain, Difficulty, Transaction};
use powchain_storage::sled_store::SledStore;
use rand::Rng;
use tempfile::{tempdir, TempDir};

pub const EASY: Difficulty = Difficulty::new(1);

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let store = SledStore::open(temp_dir.path()).expect("Failed to open SledStore");
    (temp_dir, store)
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// A valid chain of `len` blocks (genesis included) with random transfers.
pub fn mined_blocks(len: usize) -> Vec<Block> {
    let mut rng = rand::thread_rng();
    let mut chain = Chain::new(EASY);
    while chain.len() < len {
        let txs: Vec<Transaction> = (0..rng.gen_range(0..4))
            .map(|i| Transaction::new(format!("user-{i}"), "bob", rng.gen_range(1..100)))
            .collect();
        let block = Block::mine(chain.next_index(), &txs, &chain.tip().hash, EASY);
        chain.append(block).expect("freshly mined block must append");
    }
    let blocks = chain.blocks().to_vec();
    assert_eq!(blocks[0], genesis_block());
    blocks
}
