use crate::block::{adjust_difficulty, hash_parts, now_millis, Block};
use crate::crypto::canonical;
use crate::pow::meets_difficulty;
use crate::transaction::Transaction;
use rayon::prelude::*;
use tracing::{info, warn};

/// Searches nonces in parallel under the same per-attempt rule as
/// [`Block::mine`]: each attempt stamps its own time and retargets difficulty
/// against `last_block`. Whichever worker hits first wins.
pub fn mine_block_parallel(last_block: &Block, data: Vec<Transaction>) -> Block {
    // Canonical text of the parts that do not vary between attempts.
    let last_hash = canonical(&last_block.hash);
    let data_text = canonical(&data);

    let found = (1u64..u64::MAX).into_par_iter().find_map_any(|nonce| {
        let timestamp = now_millis();
        let difficulty = adjust_difficulty(last_block, timestamp);
        let hash = hash_parts(timestamp, &last_hash, &data_text, nonce, difficulty);
        meets_difficulty(&hash, difficulty).then_some((timestamp, nonce, difficulty, hash))
    });

    let Some((timestamp, nonce, difficulty, hash)) = found else {
        warn!("parallel nonce space exhausted, falling back to sequential search");
        return Block::mine(last_block, data);
    };

    info!(
        "Mined block with nonce {} difficulty {} and hash {}",
        nonce, difficulty, hash
    );

    Block {
        timestamp,
        last_hash: last_block.hash.clone(),
        hash,
        data,
        nonce,
        difficulty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Blockchain;
    use crate::wallet::Wallet;

    #[test]
    fn parallel_block_is_valid_successor() {
        let genesis = Block::genesis();
        let tx = Transaction::reward(&Wallet::new());
        let block = mine_block_parallel(&genesis, vec![tx.clone()]);

        assert_eq!(block.last_hash, genesis.hash);
        assert_eq!(block.data, vec![tx]);
        assert_eq!(block.hash, block.compute_hash());
        assert!(meets_difficulty(&block.hash, block.difficulty));
        assert!(Blockchain::is_valid_chain(&[genesis, block]));
    }

    #[test]
    fn parallel_and_sequential_blocks_chain_together() {
        let genesis = Block::genesis();
        let first = mine_block_parallel(&genesis, vec![]);
        let second = Block::mine(&first, vec![]);
        let third = mine_block_parallel(&second, vec![]);
        assert!(Blockchain::is_valid_chain(&[genesis, first, second, third]));
    }
}
