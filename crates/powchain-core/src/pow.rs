use crate::constants::{CANCEL_CHECK_INTERVAL, DEFAULT_DIFFICULTY};
use crate::Block;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Number of leading hex `'0'` digits a block hash must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u32);

impl Difficulty {
    pub const fn new(zeros: u32) -> Self {
        Self(zeros)
    }

    pub fn zeros(self) -> u32 {
        self.0
    }

    pub fn prefix(self) -> String {
        "0".repeat(self.0 as usize)
    }

    /// The difficulty predicate.
    pub fn is_met_by(self, hash: &str) -> bool {
        count_leading_zero_digits(hash) >= self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(DEFAULT_DIFFICULTY)
    }
}

pub fn count_leading_zero_digits(hash: &str) -> u32 {
    hash.bytes().take_while(|b| *b == b'0').count() as u32
}

fn hash_with_nonce(prefix: &[u8], nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher.update(nonce.to_le_bytes());
    hex::encode(hasher.finalize())
}

fn seal(mut block: Block, nonce: u64, hash: String) -> Block {
    block.nonce = nonce;
    block.hash = hash;
    info!(index = block.index, nonce, hash = %block.hash, "block sealed");
    block
}

/// Increment the nonce from the block's current value until the hash meets
/// `difficulty`. No upper bound on the number of attempts.
pub fn mine_block(block: Block, difficulty: Difficulty) -> Block {
    let prefix = block.header_prefix();
    let mut nonce = block.nonce;
    loop {
        let hash = hash_with_nonce(&prefix, nonce);
        if difficulty.is_met_by(&hash) {
            return seal(block, nonce, hash);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Sequential search that gives up once `cancel` is raised. The flag is
/// polled every `CANCEL_CHECK_INTERVAL` attempts.
pub fn search(block: Block, difficulty: Difficulty, cancel: &AtomicBool) -> Option<Block> {
    let prefix = block.header_prefix();
    let mut nonce = block.nonce;
    let mut attempts: u64 = 0;
    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            debug!(index = block.index, attempts, "nonce search cancelled");
            return None;
        }
        let hash = hash_with_nonce(&prefix, nonce);
        if difficulty.is_met_by(&hash) {
            return Some(seal(block, nonce, hash));
        }
        nonce = nonce.wrapping_add(1);
        attempts += 1;
    }
}

/// Same contract as [`search`], but splits the nonce space across the rayon
/// pool. The winning nonce is whichever thread finds one first.
pub fn search_parallel(block: Block, difficulty: Difficulty, cancel: &AtomicBool) -> Option<Block> {
    let prefix = block.header_prefix();
    let found = (0u64..u64::MAX).into_par_iter().find_any(|nonce| {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return true;
        }
        difficulty.is_met_by(&hash_with_nonce(&prefix, *nonce))
    })?;

    // A cancelled search also ends find_any; only keep a real solution.
    let hash = hash_with_nonce(&prefix, found);
    if !difficulty.is_met_by(&hash) {
        debug!(index = block.index, "parallel nonce search cancelled");
        return None;
    }
    Some(seal(block, found, hash))
}
