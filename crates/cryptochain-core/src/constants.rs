pub const BYTE: u32 = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Target interval between blocks, in milliseconds.
pub const MINE_RATE: u64 = 1000;
pub const INITIAL_DIFFICULTY: u32 = 3;

pub const STARTING_BALANCE: u64 = 1000;
pub const MINING_REWARD: u64 = 50;
pub const REWARD_INPUT_ADDRESS: &str = "*authorized-reward*";

pub const GENESIS_TIMESTAMP: u64 = 1;
pub const GENESIS_LAST_HASH: &str = "-----";
pub const GENESIS_HASH: &str = "hash-one";
