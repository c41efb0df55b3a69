use crate::block::Block;
use crate::chain::ChainHandle;
use crate::pool::PoolHandle;
use crate::transaction::Transaction;
use tracing::info;

/// Turns the pending pool into a block: valid entries plus a reward for the
/// miner's address.
#[derive(Clone)]
pub struct TransactionMiner {
    chain: ChainHandle,
    pool: PoolHandle,
    reward_address: String,
}

impl TransactionMiner {
    pub fn new(chain: ChainHandle, pool: PoolHandle, reward_address: impl Into<String>) -> Self {
        Self {
            chain,
            pool,
            reward_address: reward_address.into(),
        }
    }

    pub fn reward_address(&self) -> &str {
        &self.reward_address
    }

    /// Blocks the calling thread for the whole proof-of-work search; run it on
    /// a worker thread. The drained entries stay in flight in the pool until
    /// the block is committed.
    pub fn mine_transactions(&self) -> Block {
        let pending = self.pool.drain_valid();
        let mut data = pending.clone();
        data.push(Transaction::reward_to(&self.reward_address));

        let block = self.chain.append(data);
        self.pool.settle(&pending);
        info!(
            transactions = block.data.len() - 1,
            dropped = pending.len() + 1 - block.data.len(),
            height = self.chain.len() - 1,
            "mined pending transactions"
        );
        block
    }
}
