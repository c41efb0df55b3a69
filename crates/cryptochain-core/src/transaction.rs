use crate::block::now_millis;
use crate::constants::{MINING_REWARD, REWARD_INPUT_ADDRESS};
use crate::crypto::verify_signature;
use crate::error::{LedgerError, ValidationError};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Address to amount. Ordered so the signed payload is canonical.
pub type OutputMap = BTreeMap<String, u64>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub timestamp: u64,
    /// Sender balance when the transaction was created.
    pub amount: u64,
    pub address: String,
    pub signature: String,
}

impl TransactionInput {
    /// The unsigned sentinel input carried by mining rewards.
    pub fn reward() -> Self {
        Self {
            timestamp: 0,
            amount: 0,
            address: REWARD_INPUT_ADDRESS.to_string(),
            signature: String::new(),
        }
    }

    fn signed(sender: &Wallet, amount: u64, output_map: &OutputMap) -> Self {
        Self {
            timestamp: now_millis(),
            amount,
            address: sender.address().to_string(),
            signature: sender.sign(output_map),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub output_map: OutputMap,
    pub input: TransactionInput,
}

impl Transaction {
    /// Sends `amount` to `recipient` and the rest of the sender's balance back
    /// to the sender, signed by the sender.
    pub fn new(sender: &Wallet, recipient: &str, amount: u64) -> Result<Self, LedgerError> {
        if amount > sender.balance {
            return Err(LedgerError::InsufficientFunds {
                amount,
                balance: sender.balance,
            });
        }

        let mut output_map = OutputMap::new();
        *output_map.entry(recipient.to_string()).or_default() += amount;
        *output_map.entry(sender.address().to_string()).or_default() += sender.balance - amount;

        let input = TransactionInput::signed(sender, sender.balance, &output_map);
        Ok(Self {
            id: Uuid::new_v4(),
            output_map,
            input,
        })
    }

    /// Credits `miner` with the block reward. Never signed.
    pub fn reward(miner: &Wallet) -> Self {
        Self::reward_to(miner.address())
    }

    pub fn reward_to(address: &str) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(address.to_string(), MINING_REWARD);
        Self {
            id: Uuid::new_v4(),
            output_map,
            input: TransactionInput::reward(),
        }
    }

    pub fn is_reward(&self) -> bool {
        self.input.address == REWARD_INPUT_ADDRESS
    }

    /// Moves `amount` more from the sender's change to `recipient` and
    /// re-signs. The id and the creation-time input amount are kept.
    /// On error nothing is modified.
    pub fn update(
        &mut self,
        sender: &Wallet,
        recipient: &str,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if sender.address() != self.input.address {
            return Err(LedgerError::NotSender {
                address: sender.address().to_string(),
            });
        }

        let remaining = self.output_map.get(sender.address()).copied().unwrap_or(0);
        if amount > remaining {
            return Err(LedgerError::InsufficientFunds {
                amount,
                balance: remaining,
            });
        }

        *self.output_map.entry(recipient.to_string()).or_default() += amount;
        if let Some(change) = self.output_map.get_mut(sender.address()) {
            *change -= amount;
        }

        self.input = TransactionInput::signed(sender, self.input.amount, &self.output_map);
        Ok(())
    }

    /// Output total must equal the input amount and the signature must verify
    /// against the input address.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let total = self
            .output_map
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v));

        match total {
            Some(total) if total == self.input.amount => {}
            total => {
                return Err(ValidationError::OutputMismatch {
                    id: self.id,
                    total: total.unwrap_or(u64::MAX),
                    input: self.input.amount,
                });
            }
        }

        if !verify_signature(&self.input.address, &self.output_map, &self.input.signature) {
            return Err(ValidationError::InvalidSignature {
                id: self.id,
                address: self.input.address.clone(),
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!(%reason, "invalid transaction");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Wallet, Transaction) {
        let sender = Wallet::new();
        let tx = Transaction::new(&sender, "recipient-public-key", 50).unwrap();
        (sender, tx)
    }

    #[test]
    fn outputs_amount_to_recipient_and_change_to_sender() {
        let (sender, tx) = setup();
        assert_eq!(tx.output_map["recipient-public-key"], 50);
        assert_eq!(tx.output_map[sender.address()], sender.balance - 50);
    }

    #[test]
    fn input_records_sender_balance_and_address() {
        let (sender, tx) = setup();
        assert_eq!(tx.input.amount, sender.balance);
        assert_eq!(tx.input.address, sender.address());
        assert!(tx.input.timestamp > 0);
        assert!(verify_signature(
            sender.address(),
            &tx.output_map,
            &tx.input.signature
        ));
    }

    #[test]
    fn rejects_amount_above_balance() {
        let sender = Wallet::new();
        let err = Transaction::new(&sender, "foo", sender.balance + 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                amount: sender.balance + 1,
                balance: sender.balance
            }
        );
    }

    #[test]
    fn valid_transaction_passes() {
        let (_, tx) = setup();
        assert!(tx.is_valid());
        assert_eq!(tx.validate(), Ok(()));
    }

    #[test]
    fn tampered_output_fails() {
        let (sender, mut tx) = setup();
        tx.output_map.insert(sender.address().to_string(), 999_999);
        assert!(!tx.is_valid());
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::OutputMismatch { .. })
        ));
    }

    #[test]
    fn overflowing_outputs_fail() {
        let (_, mut tx) = setup();
        tx.output_map.insert("a".into(), u64::MAX);
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::OutputMismatch { .. })
        ));
    }

    #[test]
    fn foreign_signature_fails() {
        let (_, mut tx) = setup();
        tx.input.signature = Wallet::new().sign("fake-data");
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn update_rejects_amount_above_remaining() {
        let (sender, mut tx) = setup();
        let before = tx.clone();
        assert!(matches!(
            tx.update(&sender, "foo", 10_000_000),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(tx, before);
    }

    #[test]
    fn update_rejects_foreign_wallet() {
        let (_, mut tx) = setup();
        let before = tx.clone();
        assert!(matches!(
            tx.update(&Wallet::new(), "foo", 1),
            Err(LedgerError::NotSender { .. })
        ));
        assert_eq!(tx, before);
    }

    #[test]
    fn update_moves_amount_and_resigns() {
        let (sender, mut tx) = setup();
        let original_signature = tx.input.signature.clone();
        let original_change = tx.output_map[sender.address()];
        let id = tx.id;

        tx.update(&sender, "next-recipient", 50).unwrap();

        assert_eq!(tx.output_map["next-recipient"], 50);
        assert_eq!(tx.output_map[sender.address()], original_change - 50);
        assert_eq!(tx.output_map.values().sum::<u64>(), tx.input.amount);
        assert_ne!(tx.input.signature, original_signature);
        assert_eq!(tx.id, id);
        assert!(tx.is_valid());
    }

    #[test]
    fn repeated_update_accumulates_for_same_recipient() {
        let (sender, mut tx) = setup();
        let original_change = tx.output_map[sender.address()];
        let creation_amount = tx.input.amount;

        tx.update(&sender, "next-recipient", 50).unwrap();
        tx.update(&sender, "next-recipient", 80).unwrap();

        assert_eq!(tx.output_map["next-recipient"], 130);
        assert_eq!(tx.output_map[sender.address()], original_change - 130);
        assert_eq!(tx.input.amount, creation_amount);
        assert!(tx.is_valid());
    }

    #[test]
    fn reward_transaction_credits_miner() {
        let miner = Wallet::new();
        let reward = Transaction::reward(&miner);
        assert_eq!(reward.input, TransactionInput::reward());
        assert!(reward.is_reward());
        assert_eq!(reward.output_map.len(), 1);
        assert_eq!(reward.output_map[miner.address()], MINING_REWARD);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let (_, tx) = setup();
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("outputMap").is_some());
        assert_eq!(json["input"]["amount"], tx.input.amount);
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
