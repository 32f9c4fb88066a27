pub const HASH_HEX_SIZE: usize = 64;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_HASH: &str = "0000genesis";
pub const GENESIS_MINER: &str = "genesis";
