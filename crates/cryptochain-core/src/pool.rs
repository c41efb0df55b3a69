use crate::block::Block;
use crate::error::LedgerError;
use crate::transaction::Transaction;
use crate::wallet::Wallet;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

pub type TransactionMap = HashMap<Uuid, Transaction>;

/// Transactions waiting to be mined, keyed by id.
///
/// Entries handed to a miner move to `in_flight` until the miner settles
/// them. Their senders cannot open another transaction meanwhile, since the
/// chain does not yet show the in-flight send.
#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    transaction_map: TransactionMap,
    in_flight: TransactionMap,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_map(&self) -> &TransactionMap {
        &self.transaction_map
    }

    pub fn len(&self) -> usize {
        self.transaction_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_map.is_empty()
    }

    /// Inserts or replaces by id.
    pub fn set_transaction(&mut self, tx: Transaction) {
        debug!(id = %tx.id, sender = %tx.input.address, "pooled transaction");
        self.transaction_map.insert(tx.id, tx);
    }

    pub fn set_map(&mut self, transaction_map: TransactionMap) {
        self.transaction_map = transaction_map;
    }

    pub fn existing_transaction(&self, address: &str) -> Option<&Transaction> {
        self.transaction_map
            .values()
            .find(|tx| tx.input.address == address)
    }

    /// Entries that still pass validation; invalid ones are skipped, not removed.
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transaction_map
            .par_iter()
            .filter(|(_, tx)| tx.is_valid())
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    pub fn in_flight(&self) -> &TransactionMap {
        &self.in_flight
    }

    /// Moves the valid entries to `in_flight`, drops the rest, and returns the
    /// moved ones for mining.
    pub fn take_valid(&mut self) -> Vec<Transaction> {
        let valid = self.valid_transactions();
        self.transaction_map.clear();
        for tx in &valid {
            self.in_flight.insert(tx.id, tx.clone());
        }
        valid
    }

    /// Releases entries returned by [`TransactionPool::take_valid`] once their
    /// block is committed or abandoned.
    pub fn settle(&mut self, mined: &[Transaction]) {
        for tx in mined {
            self.in_flight.remove(&tx.id);
        }
    }

    pub fn clear(&mut self) {
        self.transaction_map.clear();
    }

    /// Drops every entry whose id is already recorded in `chain`.
    pub fn clear_blockchain_transactions(&mut self, chain: &[Block]) {
        for block in chain.iter().skip(1) {
            for tx in &block.data {
                if self.transaction_map.remove(&tx.id).is_some() {
                    debug!(id = %tx.id, "dropped mined transaction from pool");
                }
            }
        }
    }

    /// Amends the sender's outstanding transaction or creates one, keeping a
    /// single pooled transaction per sender.
    pub fn transact(
        &mut self,
        wallet: &mut Wallet,
        recipient: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, LedgerError> {
        if self
            .in_flight
            .values()
            .any(|tx| tx.input.address == wallet.address())
        {
            return Err(LedgerError::SendInFlight {
                address: wallet.address().to_string(),
            });
        }

        let existing = self
            .transaction_map
            .values_mut()
            .find(|tx| tx.input.address == wallet.address());

        let tx = match existing {
            Some(tx) => {
                tx.update(wallet, recipient, amount)?;
                tx.clone()
            }
            None => wallet.create_transaction(recipient, amount, chain)?,
        };
        self.set_transaction(tx.clone());
        Ok(tx)
    }
}

/// Shared handle to the pending pool. Every operation holds the lock for its
/// full duration.
#[derive(Clone, Default)]
pub struct PoolHandle {
    inner: Arc<Mutex<TransactionPool>>,
}

impl PoolHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TransactionMap {
        self.lock().transaction_map().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn upsert(&self, tx: Transaction) {
        self.lock().set_transaction(tx);
    }

    pub fn set_map(&self, transaction_map: TransactionMap) {
        self.lock().set_map(transaction_map);
    }

    pub fn existing_transaction(&self, address: &str) -> Option<Transaction> {
        self.lock().existing_transaction(address).cloned()
    }

    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.lock().valid_transactions()
    }

    /// Takes the valid entries and empties the pool in one step. The taken
    /// entries stay in flight until [`PoolHandle::settle`].
    pub fn drain_valid(&self) -> Vec<Transaction> {
        self.lock().take_valid()
    }

    pub fn settle(&self, mined: &[Transaction]) {
        self.lock().settle(mined);
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight().len()
    }

    pub fn clear_mined(&self, chain: &[Block]) {
        self.lock().clear_blockchain_transactions(chain);
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    pub fn transact(
        &self,
        wallet: &mut Wallet,
        recipient: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, LedgerError> {
        self.lock().transact(wallet, recipient, amount, chain)
    }

    fn lock(&self) -> MutexGuard<'_, TransactionPool> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
