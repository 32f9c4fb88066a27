use anyhow::{anyhow, bail, Context, Result};
use powchain_core::{Block, PeerMap, StateStore};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info};

pub const CHAIN_FILE: &str = "chain.json";
pub const PEERS_FILE: &str = "peers.json";

/// Whole-file JSON layout: `chain.json` holds the block array and
/// `peers.json` the peer map. Each mutation rewrites the affected file to a
/// temporary sibling and renames it into place, so a crash mid-write leaves
/// the previous version intact.
pub struct JsonStore {
    dir: PathBuf,
    blocks: Mutex<Vec<Block>>,
    peers: Mutex<PeerMap>,
}

impl JsonStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating data dir {}", dir.display()))?;
        let blocks: Vec<Block> = read_or_default(&dir.join(CHAIN_FILE))?;
        let peers: PeerMap = read_or_default(&dir.join(PEERS_FILE))?;
        info!(blocks = blocks.len(), peers = peers.len(), "json store opened");
        Ok(Self {
            dir,
            blocks: Mutex::new(blocks),
            peers: Mutex::new(peers),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(value)?;
    {
        let mut file =
            File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "state file rewritten");
    Ok(())
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("json store lock poisoned")
}

impl StateStore for JsonStore {
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
            bail!(
                "block {index} would leave a gap after height {}",
                blocks.len()
            );
        }
        write_atomic(&self.dir.join(CHAIN_FILE), &*blocks)
    }

    fn load_peers(&self) -> Result<PeerMap> {
        Ok(self.peers.lock().map_err(poisoned)?.clone())
    }

    fn put_peer(&self, address: &str, last_seen: u64) -> Result<()> {
        let mut peers = self.peers.lock().map_err(poisoned)?;
        peers.insert(address.to_string(), last_seen);
        write_atomic(&self.dir.join(PEERS_FILE), &*peers)
    }

    fn remove_peer(&self, address: &str) -> Result<()> {
        let mut peers = self.peers.lock().map_err(poisoned)?;
        if peers.remove(address).is_some() {
            write_atomic(&self.dir.join(PEERS_FILE), &*peers)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let blocks = self.blocks.lock().map_err(poisoned)?;
        write_atomic(&self.dir.join(CHAIN_FILE), &*blocks)?;
        let peers = self.peers.lock().map_err(poisoned)?;
        write_atomic(&self.dir.join(PEERS_FILE), &*peers)
    }
}
