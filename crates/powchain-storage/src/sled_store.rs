use anyhow::{bail, Context, Result};
use powchain_core::{Block, PeerMap, StateStore};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::info;

const TREE_BLOCKS: &str = "blocks";
const TREE_PEERS: &str = "peers";

/// Blocks keyed by big-endian index (so iteration is chain order), peers
/// keyed by address with a big-endian last-seen value.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  peers: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled db at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    let peers = db.open_tree(TREE_PEERS)?;
    info!(blocks = blocks.len(), peers = peers.len(), "sled store opened");
    Ok(Self { db, blocks, peers })
  }

  /// Wipe both trees and flush.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.peers.clear()?;
    self.db.flush()?;
    Ok(())
  }
}

fn decode_u64(v: &IVec) -> Result<u64> {
  let arr: [u8; 8] = v
    .as_ref()
    .try_into()
    .context("expected 8 bytes for a u64 value")?;
  Ok(u64::from_be_bytes(arr))
}

impl StateStore for SledStore {
  fn load_blocks(&self) -> Result<Vec<Block>> {
    let mut out = Vec::with_capacity(self.blocks.len());
    for entry in self.blocks.iter() {
      let (_, value) = entry?;
      let block: Block = bincode::deserialize(&value)
        .with_context(|| format!("decoding stored block {}", out.len()))?;
      if block.index != out.len() as u64 {
        bail!("gap in stored chain: expected block {}, found {}", out.len(), block.index);
      }
      out.push(block);
    }
    Ok(out)
  }

  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index.to_be_bytes();
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(key, bytes)?;
    self.db.flush()?;
    Ok(())
  }

  fn load_peers(&self) -> Result<PeerMap> {
    let mut peers = PeerMap::new();
    for entry in self.peers.iter() {
      let (key, value) = entry?;
      let address = String::from_utf8(key.to_vec()).context("peer address is not utf-8")?;
      peers.insert(address, decode_u64(&value)?);
    }
    Ok(peers)
  }

  fn put_peer(&self, address: &str, last_seen: u64) -> Result<()> {
    self.peers.insert(address.as_bytes(), last_seen.to_be_bytes().to_vec())?;
    self.db.flush()?;
    Ok(())
  }

  fn remove_peer(&self, address: &str) -> Result<()> {
    self.peers.remove(address.as_bytes())?;
    self.db.flush()?;
    Ok(())
  }

  fn flush(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
