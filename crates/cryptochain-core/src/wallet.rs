use crate::block::Block;
use crate::chain::ChainHandle;
use crate::constants::STARTING_BALANCE;
use crate::crypto;
use crate::error::LedgerError;
use crate::transaction::Transaction;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use serde::Serialize;
use std::fmt;

/// A keypair plus the balance last derived for it. The balance is a cache of
/// chain replay, never a source of truth.
pub struct Wallet {
    pub balance: u64,
    secret_key: SecretKey,
    public_key: PublicKey,
    address: String,
}

impl Wallet {
    pub fn new() -> Self {
        let (secret_key, public_key) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self {
            balance: STARTING_BALANCE,
            secret_key,
            public_key,
            address: hex::encode(public_key.serialize()),
        }
    }

    /// Hex-encoded compressed public key.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> String {
        crypto::sign(&self.secret_key, data)
    }

    /// Builds a signed transaction. When `chain` is given the balance is
    /// refreshed from it first.
    pub fn create_transaction(
        &mut self,
        recipient: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, LedgerError> {
        if let Some(chain) = chain {
            self.balance = Self::calculate_balance(chain, &self.address);
        }
        Transaction::new(self, recipient, amount)
    }

    pub fn current_balance(&self, chain: &ChainHandle) -> u64 {
        Self::calculate_balance(&chain.snapshot(), &self.address)
    }

    /// Replays the chain from the tip backwards.
    ///
    /// The wallet's most recent outgoing transaction already carries its
    /// change, so the scan stops after the block that contains it (credits in
    /// that same block still count). Without any outgoing transaction every
    /// credit is summed on top of the starting balance.
    pub fn calculate_balance(chain: &[Block], address: &str) -> u64 {
        let mut has_sent = false;
        let mut outputs_total = 0u64;

        for block in chain.iter().skip(1).rev() {
            for tx in &block.data {
                if tx.input.address == address {
                    has_sent = true;
                }
                if let Some(amount) = tx.output_map.get(address) {
                    outputs_total = outputs_total.saturating_add(*amount);
                }
            }
            if has_sent {
                break;
            }
        }

        if has_sent {
            outputs_total
        } else {
            STARTING_BALANCE.saturating_add(outputs_total)
        }
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("balance", &self.balance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Blockchain;
    use crate::crypto::verify_signature;

    #[test]
    fn starts_with_starting_balance() {
        let wallet = Wallet::new();
        assert_eq!(wallet.balance, STARTING_BALANCE);
        assert_eq!(wallet.address().len(), 66);
    }

    #[test]
    fn signs_verifiably() {
        let wallet = Wallet::new();
        let signature = wallet.sign("new-data");
        assert!(verify_signature(wallet.address(), "new-data", &signature));
        assert!(!verify_signature(
            wallet.address(),
            "new-data",
            &Wallet::new().sign("new-data")
        ));
    }

    #[test]
    fn debug_does_not_print_secret() {
        let wallet = Wallet::new();
        let printed = format!("{wallet:?}");
        assert!(printed.contains(wallet.address()));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn create_transaction_rejects_excess_amount() {
        let mut wallet = Wallet::new();
        let err = wallet
            .create_transaction("random-recipient", 1_000_000, None)
            .unwrap_err();
        assert!(err.to_string().contains("Amount exceeds balance"));
    }

    #[test]
    fn create_transaction_matches_wallet() {
        let mut wallet = Wallet::new();
        let tx = wallet.create_transaction("recipient", 50, None).unwrap();
        assert_eq!(tx.input.address, wallet.address());
        assert_eq!(tx.output_map["recipient"], 50);
    }

    #[test]
    fn create_transaction_refreshes_balance_from_chain() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();
        let tx = Wallet::new()
            .create_transaction(wallet.address(), 40, None)
            .unwrap();
        blockchain.add_block(vec![tx]);

        wallet.balance = 1;
        let tx = wallet
            .create_transaction("test", 30, Some(blockchain.chain()))
            .unwrap();
        assert_eq!(wallet.balance, STARTING_BALANCE + 40);
        assert_eq!(tx.input.amount, STARTING_BALANCE + 40);
    }

    #[test]
    fn genesis_only_chain_yields_starting_balance() {
        let blockchain = Blockchain::new();
        let address = Wallet::new().address().to_string();
        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), &address),
            STARTING_BALANCE
        );
        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), "anyone"),
            STARTING_BALANCE
        );
    }

    #[test]
    fn sums_incoming_outputs() {
        let mut blockchain = Blockchain::new();
        let wallet = Wallet::new();
        let one = Wallet::new()
            .create_transaction(wallet.address(), 50, None)
            .unwrap();
        let two = Wallet::new()
            .create_transaction(wallet.address(), 50, None)
            .unwrap();
        blockchain.add_block(vec![one, two]);

        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), wallet.address()),
            STARTING_BALANCE + 100
        );
    }

    #[test]
    fn most_recent_outgoing_transaction_sets_the_balance() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();
        let incoming = Wallet::new()
            .create_transaction(wallet.address(), 50, None)
            .unwrap();
        blockchain.add_block(vec![incoming]);

        let recent = wallet
            .create_transaction("test2", 10, Some(blockchain.chain()))
            .unwrap();
        blockchain.add_block(vec![recent.clone()]);

        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), wallet.address()),
            recent.output_map[wallet.address()]
        );
    }

    #[test]
    fn counts_outputs_beside_and_after_the_recent_transaction() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();

        let first = wallet.create_transaction("test2", 10, None).unwrap();
        blockchain.add_block(vec![first]);

        let recent = wallet
            .create_transaction("test3", 30, Some(blockchain.chain()))
            .unwrap();
        let same_block = Transaction::reward(&wallet);
        blockchain.add_block(vec![recent.clone(), same_block.clone()]);

        let next_block = Wallet::new()
            .create_transaction(wallet.address(), 40, None)
            .unwrap();
        blockchain.add_block(vec![next_block.clone()]);

        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), wallet.address()),
            recent.output_map[wallet.address()]
                + same_block.output_map[wallet.address()]
                + next_block.output_map[wallet.address()]
        );
    }

    #[test]
    fn balance_is_debited_only_once_mined() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();
        let tx = wallet.create_transaction("r", 50, Some(blockchain.chain())).unwrap();

        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), wallet.address()),
            STARTING_BALANCE
        );

        blockchain.add_block(vec![tx]);
        assert_eq!(
            Wallet::calculate_balance(blockchain.chain(), wallet.address()),
            STARTING_BALANCE - 50
        );
    }

    #[test]
    fn replay_is_repeatable() {
        let mut blockchain = Blockchain::new();
        let wallet = Wallet::new();
        blockchain.add_block(vec![Transaction::reward(&wallet)]);
        let first = Wallet::calculate_balance(blockchain.chain(), wallet.address());
        let second = Wallet::calculate_balance(blockchain.chain(), wallet.address());
        assert_eq!(first, second);
        assert_eq!(first, STARTING_BALANCE + crate::constants::MINING_REWARD);
    }
}
