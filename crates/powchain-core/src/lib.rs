use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod pool;
pub mod pow;
pub mod store;

pub use chain::{genesis_block, Chain, ChainError, RejectReason};
pub use pool::{PoolSnapshot, TransactionPool};
pub use pow::Difficulty;
pub use store::{MemoryStore, PeerMap, StateStore};

/// Milliseconds since the unix epoch. A clock set before 1970 reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// What a client submits and what nodes gossip to each other. Clients leave
/// `timestamp` out and the receiving node stamps it; gossip carries the
/// origin's stamp so every node holds an identical copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub timestamp: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: now_millis(),
        }
    }

    /// Canonical string form fed into the merkle commitment.
    pub fn canonical_string(&self) -> String {
        // Plain struct of strings and integers: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<TransactionRequest> for Transaction {
    fn from(req: TransactionRequest) -> Self {
        Self {
            sender: req.sender,
            receiver: req.receiver,
            amount: req.amount,
            timestamp: req.timestamp.unwrap_or_else(now_millis),
        }
    }
}

impl From<&Transaction> for TransactionRequest {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender: tx.sender.clone(),
            receiver: tx.receiver.clone(),
            amount: tx.amount,
            timestamp: Some(tx.timestamp),
        }
    }
}

/// Commitment over the ordered transaction list: one SHA-256 over the
/// concatenated canonical forms. Not a tree, so it offers no inclusion proofs.
pub fn merkle_root(txs: &[Transaction]) -> String {
    let joined: String = txs.iter().map(Transaction::canonical_string).collect();
    sha256_hex(joined.as_bytes())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
    pub merkle_root: String,
    /// Id of the node that sealed the block. Informational only, it is not
    /// part of the hashed header.
    #[serde(default)]
    pub miner: String,
}

impl Block {
    /// Unmined block at nonce 0. The transactions are copied so the caller's
    /// pool is never aliased by a block under construction.
    pub fn candidate(index: u64, transactions: &[Transaction], previous_hash: &str) -> Self {
        let transactions = transactions.to_vec();
        let mut block = Self {
            index,
            timestamp: now_millis(),
            merkle_root: merkle_root(&transactions),
            transactions,
            previous_hash: previous_hash.to_string(),
            nonce: 0,
            hash: String::new(),
            miner: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn with_miner(mut self, miner: impl Into<String>) -> Self {
        self.miner = miner.into();
        self
    }

    /// Build a candidate and run the proof-of-work search to completion.
    /// Blocks the calling thread until a nonce is found.
    pub fn mine(
        index: u64,
        transactions: &[Transaction],
        previous_hash: &str,
        difficulty: Difficulty,
    ) -> Self {
        pow::mine_block(Self::candidate(index, transactions, previous_hash), difficulty)
    }

    /// Every hashed field except the nonce, which always goes last.
    pub fn header_prefix(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(8 + self.previous_hash.len() + self.merkle_root.len() + 8);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(self.merkle_root.as_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header_prefix();
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn compute_hash(&self) -> String {
        sha256_hex(self.hash_bytes())
    }

    /// Check this block as the successor of `previous`.
    pub fn validate(&self, previous: &Block, difficulty: Difficulty) -> Result<(), RejectReason> {
        if self.previous_hash != previous.hash {
            return Err(RejectReason::BrokenLink);
        }
        if !difficulty.is_met_by(&self.hash) {
            return Err(RejectReason::InsufficientWork);
        }
        if self.hash != self.compute_hash() {
            return Err(RejectReason::HashMismatch);
        }
        if self.merkle_root != merkle_root(&self.transactions) {
            return Err(RejectReason::MerkleMismatch);
        }
        Ok(())
    }

    pub fn is_valid_successor(&self, previous: &Block, difficulty: Difficulty) -> bool {
        self.validate(previous, difficulty).is_ok()
    }
}
