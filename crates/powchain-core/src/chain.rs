use crate::constants::{GENESIS_HASH, GENESIS_MINER, GENESIS_PREVIOUS_HASH};
use crate::{merkle_root, Block, Difficulty};
use serde::Serialize;
use thiserror::Error;

/// Why a candidate block was not appended.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("wrong height: expected index {expected}, got {got}")]
    WrongHeight { expected: u64, got: u64 },
    #[error("previous hash does not match the chain tip")]
    BrokenLink,
    #[error("hash does not satisfy the difficulty predicate")]
    InsufficientWork,
    #[error("hash does not match the block contents")]
    HashMismatch,
    #[error("merkle root does not commit to the transactions")]
    MerkleMismatch,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("stored chain does not start with the genesis block")]
    BadGenesis,
    #[error("stored block {index} is invalid: {reason}")]
    InvalidBlock { index: u64, reason: RejectReason },
}

/// The fixed first block. Same on every node, exempt from the difficulty
/// predicate.
pub fn genesis_block() -> Block {
    Block {
        index: 0,
        timestamp: 0,
        transactions: vec![],
        previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        nonce: 0,
        hash: GENESIS_HASH.to_string(),
        merkle_root: merkle_root(&[]),
        miner: GENESIS_MINER.to_string(),
    }
}

/// Append-only sequence of blocks rooted at the genesis block.
///
/// Consensus is "first valid block at a height wins": there is no fork
/// storage and nothing is ever removed once appended.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: Difficulty,
}

impl Chain {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            blocks: vec![genesis_block()],
            difficulty,
        }
    }

    /// Rebuild a chain from persisted blocks, re-checking every link. An empty
    /// history starts a fresh chain.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: Difficulty) -> Result<Self, ChainError> {
        if blocks.is_empty() {
            return Ok(Self::new(difficulty));
        }
        let chain = Self { blocks, difficulty };
        chain.verify()?;
        Ok(chain)
    }

    /// Full re-validation of the stored history.
    pub fn verify(&self) -> Result<(), ChainError> {
        let genesis = genesis_block();
        match self.blocks.first() {
            Some(first)
                if first.index == genesis.index
                    && first.previous_hash == genesis.previous_hash
                    && first.hash == genesis.hash => {}
            _ => return Err(ChainError::BadGenesis),
        }
        for (i, pair) in self.blocks.windows(2).enumerate() {
            let expected = i as u64 + 1;
            let block = &pair[1];
            if block.index != expected {
                return Err(ChainError::InvalidBlock {
                    index: expected,
                    reason: RejectReason::WrongHeight {
                        expected,
                        got: block.index,
                    },
                });
            }
            block
                .validate(&pair[0], self.difficulty)
                .map_err(|reason| ChainError::InvalidBlock {
                    index: expected,
                    reason,
                })?;
        }
        Ok(())
    }

    /// Accept `candidate` iff it sits at the next height and validates
    /// against the tip. On rejection the chain is untouched.
    pub fn append(&mut self, candidate: Block) -> Result<(), RejectReason> {
        let expected = self.next_index();
        if candidate.index != expected {
            return Err(RejectReason::WrongHeight {
                expected,
                got: candidate.index,
            });
        }
        candidate.validate(self.tip(), self.difficulty)?;
        self.blocks.push(candidate);
        Ok(())
    }

    pub fn tip(&self) -> &Block {
        // Never empty: every constructor seeds genesis.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}
