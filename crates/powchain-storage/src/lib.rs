pub mod json_store;
pub mod sled_store;

use anyhow::{bail, Result};
use powchain_core::{MemoryStore, StateStore};
use std::{fmt, path::Path, str::FromStr, sync::Arc};
use tracing::info;

pub use json_store::JsonStore;
pub use sled_store::SledStore;

/// Which [`StateStore`] implementation backs a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Sled,
    Json,
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sled" => Ok(Backend::Sled),
            "json" => Ok(Backend::Json),
            "memory" | "mem" => Ok(Backend::Memory),
            other => bail!("unknown storage backend `{other}` (expected sled, json or memory)"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Sled => "sled",
            Backend::Json => "json",
            Backend::Memory => "memory",
        })
    }
}

pub fn open_store<P: AsRef<Path>>(backend: Backend, dir: P) -> Result<Arc<dyn StateStore>> {
    let dir = dir.as_ref();
    info!(%backend, dir = %dir.display(), "opening state store");
    Ok(match backend {
        Backend::Sled => Arc::new(SledStore::open(dir)?),
        Backend::Json => Arc::new(JsonStore::open(dir)?),
        Backend::Memory => Arc::new(MemoryStore::new()),
    })
}
