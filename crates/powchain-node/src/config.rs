use crate::constants::*;
use clap::Parser;
use powchain_core::{constants::DEFAULT_DIFFICULTY, Difficulty};
use powchain_storage::Backend;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    path::PathBuf,
    time::Duration,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "powchain-node")]
#[command(about = "Proof-of-work ledger node with HTTP gossip")]
pub struct Args {
    /// Address to listen on, e.g. 0.0.0.0:5000
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Overrides the port of `--listen`
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// URL peers use to reach this node. Defaults to http://<lan-ip>:<port>
    #[arg(long, env = "ADVERTISE")]
    pub advertise: Option<String>,

    /// Data directory for chain and peer state
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Storage backend: sled, json or memory
    #[arg(long, default_value = "sled")]
    pub storage: Backend,

    /// Seed node to register with on startup
    #[arg(long, env = "BOOTSTRAP_NODE")]
    pub bootstrap: Option<String>,

    /// Leading hex zeros required of a block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Threads for the nonce search; 1 searches sequentially
    #[arg(long, default_value_t = 1)]
    pub mining_threads: usize,

    /// Serve and gossip without running the miner
    #[arg(long)]
    pub no_mine: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    pub advertise: String,
    pub data_dir: PathBuf,
    pub storage: Backend,
    pub bootstrap: Option<String>,
    pub difficulty: Difficulty,
    pub mining_threads: usize,
    pub mining_enabled: bool,
    pub activity_window: Duration,
    pub prune_interval: Duration,
    pub idle_interval: Duration,
    pub peer_timeout: Duration,
    pub bootstrap_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let listen = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);
        Self {
            listen,
            advertise: format!("http://{listen}"),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            storage: Backend::Memory,
            bootstrap: None,
            difficulty: Difficulty::default(),
            mining_threads: 1,
            mining_enabled: true,
            activity_window: ACTIVITY_WINDOW,
            prune_interval: PRUNE_INTERVAL,
            idle_interval: IDLE_INTERVAL,
            peer_timeout: PEER_TIMEOUT,
            bootstrap_timeout: BOOTSTRAP_TIMEOUT,
        }
    }
}

impl Args {
    pub fn into_config(self) -> NodeConfig {
        let mut listen = self.listen;
        if let Some(port) = self.port {
            listen.set_port(port);
        }
        let advertise = self
            .advertise
            .map(|a| normalize_address(&a))
            .unwrap_or_else(|| format!("http://{}:{}", detect_lan_ip(), listen.port()));
        NodeConfig {
            listen,
            advertise,
            data_dir: self.data_dir,
            storage: self.storage,
            bootstrap: self.bootstrap.map(|b| normalize_address(&b)),
            difficulty: Difficulty::new(self.difficulty),
            mining_threads: self.mining_threads.max(1),
            mining_enabled: !self.no_mine,
            ..NodeConfig::default()
        }
    }
}

/// Peer addresses are compared as strings, so drop trailing slashes.
pub fn normalize_address(address: &str) -> String {
    address.trim().trim_end_matches('/').to_string()
}

/// Local address of the interface that routes off-host. No packet is sent:
/// connecting a UDP socket only selects a route.
pub fn detect_lan_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("10.255.255.255:1")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
