mod api;
mod constants;
mod seed;
mod sync;

use anyhow::Context;
use api::AppState;
use clap::Parser;
use constants::{DEFAULT_PORT, PEER_PORT_SPAN, ROOT_NODE_ADDRESS};
use cryptochain_core::Wallet;
use rand::Rng;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Pick a random port above the default one (for running extra peers)
    #[arg(long, env = "GENERATE_PEER_PORT")]
    generate_peer_port: bool,

    /// Node to sync the chain and pool from when not running on the default port
    #[arg(long, env = "ROOT_NODE_ADDRESS", default_value = ROOT_NODE_ADDRESS)]
    root_node: String,

    /// Seed the chain with demo wallets and blocks before serving
    #[arg(long, env = "DEV_SEED")]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let port = if args.generate_peer_port {
        DEFAULT_PORT + rand::thread_rng().gen_range(0..PEER_PORT_SPAN)
    } else {
        args.port
    };

    let state = AppState::new(Wallet::new());
    info!(address = %state.wallet().address(), "node wallet ready");

    if args.dev {
        let seeded = state.clone();
        tokio::task::spawn_blocking(move || seed::seed_demo(&seeded))
            .await?
            .context("seeding demo chain")?;
    }

    let app = api::router(state.clone());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("cryptochain-node listening on http://{addr}");

    if port != DEFAULT_PORT {
        let root = args.root_node.clone();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = sync::sync_with_root(&root, &state).await {
                warn!("sync with root node {root} failed: {err:#}");
            }
        });
    }

    axum::serve(listener, app).await?;
    Ok(())
}
