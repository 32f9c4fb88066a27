use std::time::Duration;

pub const ROUTE_NEW_TRANSACTION: &str = "/transactions/new";
pub const ROUTE_PENDING_TRANSACTIONS: &str = "/transactions/pending";
pub const ROUTE_CHAIN: &str = "/chain";
pub const ROUTE_CHAIN_HEAD: &str = "/chain/head";
pub const ROUTE_MINERS: &str = "/miners";
pub const ROUTE_PEERS: &str = "/peers";
pub const ROUTE_REGISTER: &str = "/register";
pub const ROUTE_RECEIVE_BLOCK: &str = "/receive_block";
pub const ROUTE_RECEIVE_TRANSACTION: &str = "/receive_transaction";
pub const ROUTE_HEALTH: &str = "/health";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "./blockchain_data";

pub const ACTIVITY_WINDOW: Duration = Duration::from_secs(30);
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(15);
pub const IDLE_INTERVAL: Duration = Duration::from_secs(5);
pub const PEER_TIMEOUT: Duration = Duration::from_secs(2);
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);
