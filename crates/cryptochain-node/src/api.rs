use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use cryptochain_core::{
    pool::TransactionMap, Block, ChainHandle, LedgerError, PoolHandle, Transaction,
    TransactionMiner, ValidationError, Wallet,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::{self, JoinError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub chain: ChainHandle,
    pub pool: PoolHandle,
    pub wallet: Arc<Mutex<Wallet>>,
    pub miner: TransactionMiner,
}

impl AppState {
    pub fn new(wallet: Wallet) -> Self {
        let chain = ChainHandle::new();
        let pool = PoolHandle::new();
        let miner = TransactionMiner::new(chain.clone(), pool.clone(), wallet.address());
        Self {
            chain,
            pool,
            wallet: Arc::new(Mutex::new(wallet)),
            miner,
        }
    }

    pub fn wallet(&self) -> MutexGuard<'_, Wallet> {
        self.wallet.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
struct MineRequest {
    #[serde(default)]
    data: Vec<Transaction>,
}

#[derive(Deserialize)]
struct TransactRequest {
    recipient: String,
    amount: u64,
}

#[derive(Serialize)]
struct WalletInfo {
    address: String,
    balance: u64,
}

/// Error body in the `{ "type": "error", "message": ... }` shape.
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "type": "error", "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err {
            LedgerError::SendInFlight { .. } => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: err.to_string(),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/api/blocks", get(blocks))
        .route("/api/mine", post(mine))
        .route("/api/transact", post(transact))
        .route("/api/transaction-pool-map", get(transaction_pool_map))
        .route("/api/mine-transactions", get(mine_transactions))
        .route("/api/wallet-info", get(wallet_info))
        .route("/api/chain", post(receive_chain))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn blocks(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(state.chain.snapshot().to_vec())
}

/// Mines `{"data": [Transaction, ..]}` straight onto the chain. Block data is
/// always a list of transactions, so any other `data` shape is rejected with
/// 422 by the extractor. Entries the chain would not accept are left out.
async fn mine(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> Result<Redirect, ApiError> {
    let chain = state.chain.clone();
    task::spawn_blocking(move || chain.append(req.data)).await?;
    Ok(Redirect::to("/api/blocks"))
}

async fn transact(
    State(state): State<AppState>,
    Json(req): Json<TransactRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chain = state.chain.snapshot();
    let tx = {
        let mut wallet = state.wallet();
        state
            .pool
            .transact(&mut wallet, &req.recipient, req.amount, Some(chain.as_slice()))?
    };
    info!(id = %tx.id, recipient = %req.recipient, amount = req.amount, "accepted transaction");
    Ok(Json(json!({ "type": "success", "transaction": tx })))
}

async fn transaction_pool_map(State(state): State<AppState>) -> Json<TransactionMap> {
    Json(state.pool.snapshot())
}

async fn mine_transactions(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let miner = state.miner.clone();
    task::spawn_blocking(move || miner.mine_transactions()).await?;
    Ok(Redirect::to("/api/blocks"))
}

async fn wallet_info(State(state): State<AppState>) -> Json<WalletInfo> {
    let wallet = state.wallet();
    Json(WalletInfo {
        address: wallet.address().to_string(),
        balance: wallet.current_balance(&state.chain),
    })
}

/// Intake for a chain pushed by a peer. Accepted chains purge their
/// transactions from the local pool.
async fn receive_chain(
    State(state): State<AppState>,
    Json(candidate): Json<Vec<Block>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (chain, pool) = (state.chain.clone(), state.pool.clone());
    let result = task::spawn_blocking(move || {
        chain.replace(candidate, true, |incoming| pool.clear_mined(incoming))
    })
    .await?;

    if let Err(reason) = &result {
        warn!(%reason, "peer chain rejected");
    }
    result?;
    Ok(Json(json!({ "type": "success", "length": state.chain.len() })))
}
