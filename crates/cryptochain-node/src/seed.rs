use crate::api::AppState;
use crate::constants::DEMO_ROUNDS;
use cryptochain_core::{LedgerError, Wallet};
use tracing::info;

/// Three wallets passing value around, one block mined per round.
pub(crate) fn seed_demo(state: &AppState) -> Result<(), LedgerError> {
    let mut first = Wallet::new();
    let mut second = Wallet::new();
    let node_address = state.wallet().address().to_string();
    let first_address = first.address().to_string();
    let second_address = second.address().to_string();

    let transact = |wallet: &mut Wallet, recipient: &str, amount: u64| {
        let chain = state.chain.snapshot();
        state
            .pool
            .transact(wallet, recipient, amount, Some(chain.as_slice()))
            .map(|_| ())
    };
    let node_action = || {
        let mut wallet = state.wallet();
        transact(&mut *wallet, &first_address, 5)
    };

    for round in 0..DEMO_ROUNDS {
        match round % 3 {
            0 => {
                node_action()?;
                transact(&mut first, &second_address, 10)?;
            }
            1 => {
                node_action()?;
                transact(&mut second, &node_address, 15)?;
            }
            _ => {
                transact(&mut first, &second_address, 10)?;
                transact(&mut second, &node_address, 15)?;
            }
        }
        state.miner.mine_transactions();
    }

    info!(height = state.chain.len() - 1, "seeded demo chain");
    Ok(())
}
