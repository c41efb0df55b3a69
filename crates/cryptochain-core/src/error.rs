use thiserror::Error;
use uuid::Uuid;

/// Why a transaction, block or candidate chain was rejected.
///
/// Validation never aborts the caller: a rejected unit is dropped and the
/// current ledger state is kept as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain does not start with the genesis block")]
    GenesisMismatch,

    #[error("block {index} lastHash does not match the previous block hash")]
    LastHashMismatch { index: usize },

    #[error("block {index} hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("block {index} difficulty jumped from {previous} to {current}")]
    DifficultyJump {
        index: usize,
        previous: u32,
        current: u32,
    },

    #[error("incoming chain of length {incoming} is not longer than current length {current}")]
    ChainNotLonger { incoming: usize, current: usize },

    #[error("block {index} carries more than one mining reward")]
    DuplicateReward { index: usize },

    #[error("block {index} mining reward is invalid")]
    InvalidReward { index: usize },

    #[error("transaction {id} outputs total {total} but its input amount is {input}")]
    OutputMismatch { id: Uuid, total: u64, input: u64 },

    #[error("transaction {id} has an invalid signature from {address}")]
    InvalidSignature { id: Uuid, address: String },

    #[error("transaction {id} declares input amount {declared}, chain history says {actual}")]
    InvalidInputAmount { id: Uuid, declared: u64, actual: u64 },

    #[error("transaction {id} appears more than once in block {index}")]
    DuplicateTransaction { id: Uuid, index: usize },
}

/// Failure to build or amend a transaction. The wallet and pool are left as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Amount exceeds balance: requested {amount}, available {balance}")]
    InsufficientFunds { amount: u64, balance: u64 },

    #[error("wallet {address} is not the sender of this transaction")]
    NotSender { address: String },

    #[error("a transaction from {address} is being mined, retry once it is recorded")]
    SendInFlight { address: String },
}
