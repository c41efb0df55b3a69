use crate::api::AppState;
use anyhow::Result;
use cryptochain_core::{pool::TransactionMap, Block};
use tokio::task;
use tracing::{info, warn};

/// Pulls the root node's chain and pending pool. The root chain is taken on
/// structure alone; its transactions are not re-validated.
pub(crate) async fn sync_with_root(root: &str, state: &AppState) -> Result<()> {
    let client = reqwest::Client::new();

    let root_chain: Vec<Block> = client
        .get(format!("{root}/api/blocks"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!(length = root_chain.len(), "replacing chain with root chain");
    let chain = state.chain.clone();
    let adopted = task::spawn_blocking(move || chain.replace(root_chain, false, |_| {})).await?;
    if let Err(reason) = adopted {
        warn!(%reason, "root chain not adopted");
    }

    let root_pool: TransactionMap = client
        .get(format!("{root}/api/transaction-pool-map"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!(transactions = root_pool.len(), "replacing transaction pool map with root pool");
    state.pool.set_map(root_pool);

    Ok(())
}
