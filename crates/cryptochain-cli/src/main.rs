use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cryptochain-cli")]
#[command(about = "CLI client for a cryptochain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:3001)
    #[arg(long, global = true, default_value = "http://127.0.0.1:3001")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send coins from the node's wallet
    Transact {
        /// Recipient address
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Mine the pending pool into a new block
    Mine,
    /// Show the node's wallet address and balance
    Wallet,
    /// Dump the chain
    Blocks,
    /// Dump the pending transaction pool
    Pool,
}

#[derive(Serialize)]
struct Transact {
    recipient: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let node = cli.node.trim_end_matches('/');

    let res = match cli.cmd {
        Command::Transact { recipient, amount } => {
            client
                .post(format!("{node}/api/transact"))
                .json(&Transact { recipient, amount })
                .send()
                .await?
        }
        // follows the redirect to the updated chain
        Command::Mine => client.get(format!("{node}/api/mine-transactions")).send().await?,
        Command::Wallet => client.get(format!("{node}/api/wallet-info")).send().await?,
        Command::Blocks => client.get(format!("{node}/api/blocks")).send().await?,
        Command::Pool => {
            client
                .get(format!("{node}/api/transaction-pool-map"))
                .send()
                .await?
        }
    };

    let status = res.status();
    debug!(%status, url = %res.url(), "node responded");
    let body: Value = res.json().await?;
    println!("status: {}", status);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
