//! Ledger node: composes the chain, the transaction pool, the peer registry
//! and the miner, and exposes them over HTTP.

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod miner;
pub mod node;
pub mod peers;

pub use config::{Args, NodeConfig};
pub use error::NodeError;
pub use miner::{MineOutcome, Miner, MinerState};
pub use node::{Health, Ledger, Node};
pub use peers::{HttpPeerClient, PeerClient, PeerError, PeerRegistry};
