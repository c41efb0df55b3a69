pub mod block;
pub mod chain;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod mine;
pub mod miner;
pub mod pool;
pub mod transaction;
pub mod wallet;

pub use block::Block;
pub use chain::{Blockchain, ChainHandle};
pub use error::{LedgerError, ValidationError};
pub use miner::TransactionMiner;
pub use pool::{PoolHandle, TransactionPool};
pub use transaction::{Transaction, TransactionInput};
pub use wallet::Wallet;

pub mod pow {
    use crate::constants::{BYTE, HASH_HEX_SIZE};

    /// True when the hex digest, read as a bit string, starts with at least
    /// `difficulty` zeros. Anything that is not a full hex digest fails.
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        if hash.len() != HASH_HEX_SIZE {
            return false;
        }
        match hex::decode(hash) {
            Ok(bytes) => count_leading_zero_bits(&bytes) >= difficulty,
            Err(_) => false,
        }
    }

    pub fn count_leading_zero_bits(hash: &[u8]) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += BYTE;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_bits_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::count_leading_zero_bits(&h), 256);
        h[0] = 0x0F; // 00001111
        assert_eq!(pow::count_leading_zero_bits(&h), 4);
        h = [0u8; 32];
        h[1] = 0x80; // 00000000 10000000
        assert_eq!(pow::count_leading_zero_bits(&h), 8);
        h[1] = 0x40; // 01000000
        assert_eq!(pow::count_leading_zero_bits(&h), 9);
    }

    #[test]
    fn meets_difficulty_reads_hex_as_bits() {
        let hash = format!("0f{}", "ff".repeat(31));
        assert!(pow::meets_difficulty(&hash, 4));
        assert!(!pow::meets_difficulty(&hash, 5));
        assert!(pow::meets_difficulty(&hash, 0));
    }

    #[test]
    fn meets_difficulty_rejects_non_digests() {
        assert!(!pow::meets_difficulty("hash-one", 0));
        assert!(!pow::meets_difficulty("00", 1));
        assert!(!pow::meets_difficulty(&"zz".repeat(32), 0));
    }
}
