use crate::block::Block;
use crate::constants::MINING_REWARD;
use crate::error::ValidationError;
use crate::mine::mine_block_parallel;
use crate::transaction::Transaction;
use crate::wallet::Wallet;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The ledger: an ordered list of blocks that always starts with genesis.
///
/// Blocks sit behind an `Arc` so a snapshot handed to a reader stays intact
/// when the chain is later appended to or replaced.
#[derive(Clone, Debug)]
pub struct Blockchain {
    chain: Arc<Vec<Block>>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(vec![Block::genesis()]),
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn snapshot(&self) -> Arc<Vec<Block>> {
        Arc::clone(&self.chain)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn tip(&self) -> &Block {
        // never empty: genesis is always present
        &self.chain[self.chain.len() - 1]
    }

    /// Mines `data` on top of the tip and appends the result.
    pub fn add_block(&mut self, data: Vec<Transaction>) -> &Block {
        let block = Block::mine(self.tip(), data);
        self.push(block);
        self.tip()
    }

    pub(crate) fn push(&mut self, block: Block) {
        info!(
            height = self.chain.len(),
            nonce = block.nonce,
            difficulty = block.difficulty,
            hash = %block.hash,
            "appended block"
        );
        Arc::make_mut(&mut self.chain).push(block);
    }

    /// Structural check of a candidate chain, independent of any ledger state.
    pub fn validate_chain(chain: &[Block]) -> Result<(), ValidationError> {
        match chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => return Err(ValidationError::GenesisMismatch),
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if block.last_hash != previous.hash {
                return Err(ValidationError::LastHashMismatch { index });
            }

            if block.hash != block.compute_hash() {
                return Err(ValidationError::HashMismatch { index });
            }

            if previous.difficulty.abs_diff(block.difficulty) > 1 {
                return Err(ValidationError::DifficultyJump {
                    index,
                    previous: previous.difficulty,
                    current: block.difficulty,
                });
            }
        }

        Ok(())
    }

    pub fn is_valid_chain(chain: &[Block]) -> bool {
        match Self::validate_chain(chain) {
            Ok(()) => true,
            Err(reason) => {
                warn!(%reason, "invalid chain");
                false
            }
        }
    }

    /// Checks every non-genesis block's transactions. Input amounts are judged
    /// against balances replayed from *this* ledger, never the candidate's own
    /// history.
    pub fn validate_transaction_data(&self, candidate: &[Block]) -> Result<(), ValidationError> {
        for (index, block) in candidate.iter().enumerate().skip(1) {
            let mut seen = HashSet::new();
            let mut rewards = 0usize;

            for tx in &block.data {
                if tx.is_reward() {
                    rewards += 1;
                    if rewards > 1 {
                        return Err(ValidationError::DuplicateReward { index });
                    }
                    if tx.output_map.len() != 1
                        || tx.output_map.values().next() != Some(&MINING_REWARD)
                    {
                        return Err(ValidationError::InvalidReward { index });
                    }
                    continue;
                }

                tx.validate()?;

                let actual = Wallet::calculate_balance(&self.chain, &tx.input.address);
                if tx.input.amount != actual {
                    return Err(ValidationError::InvalidInputAmount {
                        id: tx.id,
                        declared: tx.input.amount,
                        actual,
                    });
                }

                if !seen.insert(tx.id) {
                    return Err(ValidationError::DuplicateTransaction { id: tx.id, index });
                }
            }
        }

        Ok(())
    }

    pub fn valid_transaction_data(&self, candidate: &[Block]) -> bool {
        match self.validate_transaction_data(candidate) {
            Ok(()) => true,
            Err(reason) => {
                error!(%reason, "invalid transaction data");
                false
            }
        }
    }

    /// Longest valid chain wins. Ties keep the current chain. `on_success`
    /// runs exactly once, right before the swap, and only if the swap happens.
    pub fn replace_chain<F>(
        &mut self,
        candidate: Vec<Block>,
        validate_transactions: bool,
        on_success: F,
    ) -> Result<(), ValidationError>
    where
        F: FnOnce(&[Block]),
    {
        if let Err(reason) = self.check_replacement(&candidate, validate_transactions) {
            error!(%reason, "rejected incoming chain");
            return Err(reason);
        }
        self.swap(candidate, on_success);
        Ok(())
    }

    fn swap<F>(&mut self, candidate: Vec<Block>, on_success: F)
    where
        F: FnOnce(&[Block]),
    {
        on_success(&candidate);
        info!(length = candidate.len(), "replacing chain");
        self.chain = Arc::new(candidate);
    }

    /// Same length and tip as `base`.
    fn is_unchanged_since(&self, base: &Blockchain) -> bool {
        self.len() == base.len() && self.tip().hash == base.tip().hash
    }

    /// The part of `data` this ledger accepts on top of its tip. Dropped:
    /// ids already recorded or repeated, a second send from one address,
    /// input amounts that no longer match the replayed balance, invalid
    /// transactions and any reward past the first well-formed one.
    pub(crate) fn admissible(&self, data: &[Transaction]) -> Vec<Transaction> {
        let recorded: HashSet<Uuid> = self
            .chain
            .iter()
            .skip(1)
            .flat_map(|block| block.data.iter().map(|tx| tx.id))
            .collect();
        let mut ids = HashSet::new();
        let mut senders = HashSet::new();
        let mut rewarded = false;

        data.iter()
            .filter(|tx| {
                if recorded.contains(&tx.id) || !ids.insert(tx.id) {
                    warn!(id = %tx.id, "dropping transaction already recorded");
                    return false;
                }

                if tx.is_reward() {
                    let well_formed = !rewarded
                        && tx.output_map.len() == 1
                        && tx.output_map.values().all(|amount| *amount == MINING_REWARD);
                    rewarded |= well_formed;
                    return well_formed;
                }

                if !senders.insert(tx.input.address.clone()) {
                    warn!(id = %tx.id, sender = %tx.input.address, "dropping second send from sender");
                    return false;
                }

                let balance = Wallet::calculate_balance(&self.chain, &tx.input.address);
                if tx.input.amount != balance {
                    warn!(
                        id = %tx.id,
                        declared = tx.input.amount,
                        balance,
                        "dropping transaction with stale input amount"
                    );
                    return false;
                }

                tx.is_valid()
            })
            .cloned()
            .collect()
    }

    fn check_replacement(
        &self,
        candidate: &[Block],
        validate_transactions: bool,
    ) -> Result<(), ValidationError> {
        if candidate.len() <= self.chain.len() {
            return Err(ValidationError::ChainNotLonger {
                incoming: candidate.len(),
                current: self.chain.len(),
            });
        }
        Self::validate_chain(candidate)?;
        if validate_transactions {
            self.validate_transaction_data(candidate)?;
        }
        Ok(())
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the process ledger.
///
/// Reads take the lock only long enough to clone the current snapshot.
/// Mining runs outside the chain lock; one miner at a time.
#[derive(Clone, Default)]
pub struct ChainHandle {
    inner: Arc<RwLock<Blockchain>>,
    mining: Arc<Mutex<()>>,
}

impl ChainHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blockchain(blockchain: Blockchain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(blockchain)),
            mining: Arc::default(),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Block>> {
        self.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn tip(&self) -> Block {
        self.read().tip().clone()
    }

    /// Mines the admissible part of `data` onto the current tip and appends
    /// it. If the chain changes while the search runs, `data` is filtered
    /// again against the new tip and the search restarts.
    pub fn append(&self, data: Vec<Transaction>) -> Block {
        let _miner = lock(&self.mining);
        loop {
            let base = self.read().clone();
            let admitted = base.admissible(&data);
            let block = mine_block_parallel(base.tip(), admitted);

            let mut chain = self.write();
            if chain.is_unchanged_since(&base) {
                drop(base);
                chain.push(block.clone());
                return block;
            }
            warn!("chain moved while mining, restarting search");
        }
    }

    /// Validates `candidate` against a snapshot without blocking readers, then
    /// swaps under the write lock only if the chain has not moved since.
    pub fn replace<F>(
        &self,
        candidate: Vec<Block>,
        validate_transactions: bool,
        on_success: F,
    ) -> Result<(), ValidationError>
    where
        F: FnOnce(&[Block]),
    {
        let mut pending = (candidate, on_success);
        loop {
            let base = self.read().clone();
            if let Err(reason) = base.check_replacement(&pending.0, validate_transactions) {
                error!(%reason, "rejected incoming chain");
                return Err(reason);
            }

            match self.swap_if_unchanged(&base, pending.0, pending.1) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    warn!("chain moved while validating, validating again");
                    pending = returned;
                }
            }
        }
    }

    /// Hands the arguments back when the chain no longer matches `base`.
    fn swap_if_unchanged<F>(
        &self,
        base: &Blockchain,
        candidate: Vec<Block>,
        on_success: F,
    ) -> Result<(), (Vec<Block>, F)>
    where
        F: FnOnce(&[Block]),
    {
        let mut chain = self.write();
        if !chain.is_unchanged_since(base) {
            return Err((candidate, on_success));
        }
        chain.swap(candidate, on_success);
        Ok(())
    }

    pub fn is_valid_transaction_data(&self, candidate: &[Block]) -> bool {
        self.read().valid_transaction_data(candidate)
    }

    fn read(&self) -> RwLockReadGuard<'_, Blockchain> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Blockchain> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
