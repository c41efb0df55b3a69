use crate::constants::{
    GENESIS_HASH, GENESIS_LAST_HASH, GENESIS_TIMESTAMP, INITIAL_DIFFICULTY, MINE_RATE,
};
use crate::crypto::{canonical, crypto_hash};
use crate::pow::meets_difficulty;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A mined unit of the chain. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub last_hash: String,
    pub hash: String,
    pub data: Vec<Transaction>,
    pub nonce: u64,
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block shared by every node. Its hash is a constant and
    /// is never recomputed.
    pub fn genesis() -> Self {
        Self {
            timestamp: GENESIS_TIMESTAMP,
            last_hash: GENESIS_LAST_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            data: vec![],
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
        }
    }

    /// Searches nonces until the hash has `difficulty` leading zero bits.
    /// Timestamp and difficulty are re-derived on every attempt.
    pub fn mine(last_block: &Block, data: Vec<Transaction>) -> Self {
        let last_hash = canonical(&last_block.hash);
        let data_text = canonical(&data);
        let mut nonce = 0u64;

        loop {
            nonce = nonce.wrapping_add(1);
            let timestamp = now_millis();
            let difficulty = adjust_difficulty(last_block, timestamp);
            let hash = hash_parts(timestamp, &last_hash, &data_text, nonce, difficulty);

            if meets_difficulty(&hash, difficulty) {
                return Self {
                    timestamp,
                    last_hash: last_block.hash.clone(),
                    hash,
                    data,
                    nonce,
                    difficulty,
                };
            }
        }
    }

    /// Hash of this block's own fields, independent of the stored `hash`.
    pub fn compute_hash(&self) -> String {
        block_hash(
            self.timestamp,
            &self.last_hash,
            &self.data,
            self.nonce,
            self.difficulty,
        )
    }
}

/// One step retarget against the previous block. Never returns less than 1.
pub fn adjust_difficulty(original_block: &Block, timestamp: u64) -> u32 {
    let difficulty = original_block.difficulty;
    if difficulty < 1 {
        return 1;
    }

    if timestamp.saturating_sub(original_block.timestamp) > MINE_RATE {
        return difficulty.saturating_sub(1).max(1);
    }

    difficulty.saturating_add(1)
}

pub fn block_hash(
    timestamp: u64,
    last_hash: &str,
    data: &[Transaction],
    nonce: u64,
    difficulty: u32,
) -> String {
    crate::crypto_hash!(timestamp, last_hash, data, nonce, difficulty)
}

/// Same digest as [`block_hash`] with the invariant inputs already canonicalized.
pub(crate) fn hash_parts(
    timestamp: u64,
    last_hash: &str,
    data: &str,
    nonce: u64,
    difficulty: u32,
) -> String {
    crypto_hash([
        canonical(&timestamp),
        last_hash.to_string(),
        data.to_string(),
        canonical(&nonce),
        canonical(&difficulty),
    ])
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
