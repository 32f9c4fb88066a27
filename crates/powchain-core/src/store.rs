use crate::Block;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Peer address -> last-seen time in milliseconds.
pub type PeerMap = BTreeMap<String, u64>;

/// Persistence the node writes through on every mutation.
/// This lives in `powchain-core` so backends don't depend on the node crate.
pub trait StateStore: Send + Sync {
    /// Every stored block in index order.
    fn load_blocks(&self) -> Result<Vec<Block>>;
    fn put_block(&self, block: &Block) -> Result<()>;
    fn load_peers(&self) -> Result<PeerMap>;
    fn put_peer(&self, address: &str, last_seen: u64) -> Result<()>;
    fn remove_peer(&self, address: &str) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

/// Volatile store for tests and for running without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<Vec<Block>>,
    peers: Mutex<PeerMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

impl StateStore for MemoryStore {
    fn load_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.lock().map_err(poisoned)?.clone())
    }

    fn put_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.lock().map_err(poisoned)?;
        let index = block.index as usize;
        if index < blocks.len() {
            blocks[index] = block.clone();
        } else if index == blocks.len() {
            blocks.push(block.clone());
        } else {
            return Err(anyhow!(
                "block {index} would leave a gap after height {}",
                blocks.len()
            ));
        }
        Ok(())
    }

    fn load_peers(&self) -> Result<PeerMap> {
        Ok(self.peers.lock().map_err(poisoned)?.clone())
    }

    fn put_peer(&self, address: &str, last_seen: u64) -> Result<()> {
        self.peers
            .lock()
            .map_err(poisoned)?
            .insert(address.to_string(), last_seen);
        Ok(())
    }

    fn remove_peer(&self, address: &str) -> Result<()> {
        self.peers.lock().map_err(poisoned)?.remove(address);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
