//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Board actions (create, enlist, contribute) apply locally in demo mode;
//! in live mode they go through the wallet-signing endpoints instead.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::board::chain::{toggle_data_source, MissionFetcher};
use crate::board::{
    DashboardSummary, DataMode, MissionDetail, MissionForm, MissionView, MyMissions,
    PriceSnapshot, SharedBoard,
};
use crate::contracts::{ContractCall, ContractInvoker, MissionControllerClient, PreparedTransaction};
use crate::monitor::MonitorStatus;
use crate::price::{PriceFeedStatus, PriceService, PriceStats};
use crate::soroban::horizon::{HorizonClient, WalletBalance};
use crate::soroban::keys::parse_account_id;
use crate::types::{from_units, ContractFailure, MissionError, MissionParams, STROOP_DECIMALS};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Contract access for live mode.
pub struct ChainAccess {
    pub invoker: Arc<dyn ContractInvoker>,
    pub controller: MissionControllerClient,
    pub fetcher: Arc<dyn MissionFetcher>,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub board: SharedBoard,
    pub prices: Arc<PriceService>,
    pub monitor: Option<Arc<RwLock<MonitorStatus>>>,
    pub chain: Option<ChainAccess>,
    pub horizon: Option<HorizonClient>,
    pub network: String,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(board: SharedBoard, prices: Arc<PriceService>, network: &str) -> Self {
        Self {
            board,
            prices,
            monitor: None,
            chain: None,
            horizon: None,
            network: network.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn with_monitor(mut self, status: Arc<RwLock<MonitorStatus>>) -> Self {
        self.monitor = Some(status);
        self
    }

    pub fn with_chain(mut self, chain: ChainAccess) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_horizon(mut self, horizon: HorizonClient) -> Self {
        self.horizon = Some(horizon);
        self
    }

    fn chain(&self) -> Result<&ChainAccess, ApiError> {
        self.chain.as_ref().ok_or_else(|| {
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "no mission controller configured",
            )
        })
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    missing_fields: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing_fields: Vec<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            missing_fields: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(err: &MissionError) -> StatusCode {
    match err {
        MissionError::MissingFields(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MissionError::Validation(_) | MissionError::InvalidKey(_) | MissionError::Xdr(_) => {
            StatusCode::BAD_REQUEST
        }
        MissionError::MissionNotFound(_) => StatusCode::NOT_FOUND,
        MissionError::AlreadyEnlisted(_) => StatusCode::CONFLICT,
        MissionError::Contract { failure, .. } => match failure {
            ContractFailure::Unauthorized => StatusCode::FORBIDDEN,
            ContractFailure::NotFound => StatusCode::NOT_FOUND,
            ContractFailure::MissionInactive
            | ContractFailure::MissionExpired
            | ContractFailure::AlreadyEnlisted => StatusCode::CONFLICT,
            ContractFailure::Host(_) => StatusCode::BAD_GATEWAY,
        },
        MissionError::Rpc { .. } | MissionError::Transaction { .. } | MissionError::Decode(_) => {
            StatusCode::BAD_GATEWAY
        }
        MissionError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<MissionError> for ApiError {
    fn from(err: MissionError) -> Self {
        let missing_fields = match &err {
            MissionError::MissingFields(fields) => fields.clone(),
            _ => Vec::new(),
        };
        Self {
            status: status_for(&err),
            message: err.to_string(),
            missing_fields,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<MissionError>() {
            Ok(mission_err) => mission_err.into(),
            Err(other) => ApiError::new(StatusCode::BAD_GATEWAY, format!("{other:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            missing_fields: self.missing_fields,
        };
        (self.status, Json(body)).into_response()
    }
}

fn live_mode_conflict() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "live mode: build a transaction with /api/tx/build and sign it in your wallet",
    )
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    /// Target mode; toggles when absent.
    #[serde(default)]
    pub mode: Option<DataMode>,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: DataMode,
    pub missions: usize,
}

#[derive(Debug, Deserialize)]
pub struct MockPriceRequest {
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct MockPriceResponse {
    pub mock_base_price: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub network: String,
    pub mode: DataMode,
    pub uptime_secs: i64,
}

/// A mission controller write to be signed by the caller's wallet.
/// Amounts are display units (KALE, USD).
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TxRequest {
    CreateMission {
        source: String,
        target_liquidity: f64,
        reward_pool: f64,
        duration_hours: u64,
        trigger_price: f64,
    },
    Enlist {
        source: String,
        mission_id: u64,
        amount: f64,
    },
    Contribute {
        source: String,
        mission_id: u64,
        amount: f64,
        /// Hex-encoded proof bytes.
        #[serde(default)]
        proof: Option<String>,
    },
}

fn positive(name: &str, value: f64) -> Result<i128, MissionError> {
    if !(value > 0.0) {
        return Err(MissionError::Validation(format!("{name} must be positive")));
    }
    Ok(from_units(value, STROOP_DECIMALS))
}

impl TxRequest {
    pub fn source(&self) -> &str {
        match self {
            TxRequest::CreateMission { source, .. }
            | TxRequest::Enlist { source, .. }
            | TxRequest::Contribute { source, .. } => source,
        }
    }

    /// The contract call this request stands for.
    pub fn to_call(&self, controller: &MissionControllerClient) -> Result<ContractCall, ApiError> {
        let call = match self {
            TxRequest::CreateMission {
                source,
                target_liquidity,
                reward_pool,
                duration_hours,
                trigger_price,
            } => {
                if *duration_hours == 0 {
                    return Err(MissionError::Validation("duration_hours must be positive".into()).into());
                }
                let params = MissionParams {
                    target_liquidity: positive("target_liquidity", *target_liquidity)?,
                    reward_pool: positive("reward_pool", *reward_pool)?,
                    duration_hours: *duration_hours,
                    trigger_price: positive("trigger_price", *trigger_price)?,
                };
                controller.create_mission_call(source, &params)?
            }
            TxRequest::Enlist {
                source,
                mission_id,
                amount,
            } => controller.enlist_call(source, *mission_id, positive("amount", *amount)?)?,
            TxRequest::Contribute {
                source,
                mission_id,
                amount,
                proof,
            } => {
                let proof = match proof {
                    Some(h) => hex::decode(h.trim_start_matches("0x")).map_err(|e| {
                        MissionError::Validation(format!("proof is not valid hex: {e}"))
                    })?,
                    None => Vec::new(),
                };
                controller.add_contribution_call(
                    source,
                    *mission_id,
                    positive("amount", *amount)?,
                    &proof,
                )?
            }
        };
        Ok(call)
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub signed_xdr: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub hash: String,
    pub ledger: Option<u32>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mode = state.board.read().await.mode;
    Json(HealthResponse {
        status: "ok",
        network: state.network.clone(),
        mode,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/missions
pub async fn list_missions(State(state): State<AppState>) -> Json<Vec<MissionView>> {
    Json(state.board.read().await.missions.clone())
}

/// GET /api/missions/:id
pub async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MissionDetail>, ApiError> {
    state
        .board
        .read()
        .await
        .detail(&id, Utc::now())
        .map(Json)
        .ok_or_else(|| MissionError::MissionNotFound(id).into())
}

/// POST /api/missions
pub async fn create_mission(
    State(state): State<AppState>,
    Json(form): Json<MissionForm>,
) -> Result<(StatusCode, Json<MissionView>), ApiError> {
    let mut board = state.board.write().await;
    if board.mode == DataMode::Live {
        return Err(live_mode_conflict());
    }
    let mission = board.create_mission(&form, Utc::now())?;
    Ok((StatusCode::CREATED, Json(mission)))
}

/// POST /api/missions/:id/enlist
pub async fn enlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<MissionDetail>, ApiError> {
    let mut board = state.board.write().await;
    if board.mode == DataMode::Live {
        return Err(live_mode_conflict());
    }
    let now = Utc::now();
    board.enlist(&id, req.amount, now)?;
    board
        .detail(&id, now)
        .map(Json)
        .ok_or_else(|| MissionError::MissionNotFound(id).into())
}

/// POST /api/missions/:id/contribute
pub async fn contribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<MissionView>, ApiError> {
    let mut board = state.board.write().await;
    if board.mode == DataMode::Live {
        return Err(live_mode_conflict());
    }
    Ok(Json(board.add_contribution(&id, req.amount, Utc::now())?))
}

/// GET /api/me/missions
pub async fn my_missions(State(state): State<AppState>) -> Json<MyMissions> {
    Json(state.board.read().await.my_missions())
}

/// GET /api/summary
pub async fn summary(State(state): State<AppState>) -> Json<DashboardSummary> {
    Json(state.board.read().await.summary())
}

/// GET /api/price
pub async fn get_price(State(state): State<AppState>) -> Json<PriceSnapshot> {
    Json(state.board.read().await.price.clone())
}

/// GET /api/price/stats
pub async fn price_stats(State(state): State<AppState>) -> Json<PriceStats> {
    Json(PriceStats::from_snapshot(&state.board.read().await.price))
}

/// GET /api/price/feed
pub async fn price_feed(State(state): State<AppState>) -> Json<PriceFeedStatus> {
    Json(state.prices.status().await)
}

/// POST /api/price/mock
pub async fn set_mock_price(
    State(state): State<AppState>,
    Json(req): Json<MockPriceRequest>,
) -> Result<Json<MockPriceResponse>, ApiError> {
    if !req.price.is_finite() || req.price <= 0.0 {
        return Err(MissionError::Validation("price must be positive".into()).into());
    }
    Ok(Json(MockPriceResponse {
        mock_base_price: state.prices.update_mock_price(req.price).await,
    }))
}

/// POST /api/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<ModeResponse>, ApiError> {
    let current = state.board.read().await.mode;
    if current == DataMode::Demo && req.mode != Some(DataMode::Demo) && state.chain.is_none() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "live data needs a configured mission controller",
        ));
    }
    let mode = match req.mode {
        Some(target) if target == current => current,
        _ => {
            let fetcher = state.chain.as_ref().map(|c| c.fetcher.as_ref());
            toggle_data_source(&state.board, fetcher)
                .await
                .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("{e:#}")))?
        }
    };

    if mode == DataMode::Live && current == DataMode::Demo {
        let snapshot = state.prices.refresh_now(DataMode::Live).await;
        state.board.write().await.update_price_data(snapshot);
    }

    let missions = state.board.read().await.missions.len();
    Ok(Json(ModeResponse { mode, missions }))
}

/// GET /api/monitor
pub async fn monitor_status(State(state): State<AppState>) -> Json<MonitorStatus> {
    match &state.monitor {
        Some(status) => Json(status.read().await.clone()),
        None => Json(MonitorStatus::default()),
    }
}

/// GET /api/wallet/:address
pub async fn wallet(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<WalletBalance>, ApiError> {
    parse_account_id(&address)?;
    let horizon = state
        .horizon
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "no Horizon configured"))?;
    Ok(Json(horizon.wallet_balance(&address).await?))
}

/// POST /api/tx/build
pub async fn build_transaction(
    State(state): State<AppState>,
    Json(req): Json<TxRequest>,
) -> Result<Json<PreparedTransaction>, ApiError> {
    let chain = state.chain()?;
    parse_account_id(req.source())?;
    let call = req.to_call(&chain.controller)?;
    let prepared = chain.invoker.prepare(&call, req.source()).await?;
    info!(function = %call.function, source = req.source(), hash = %prepared.hash, "Prepared transaction for signing");
    Ok(Json(prepared))
}

/// POST /api/tx/submit
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let chain = state.chain()?;
    let receipt = chain.invoker.submit_signed(&req.signed_xdr).await?;
    info!(hash = %receipt.hash, ledger = ?receipt.ledger, "Signed transaction confirmed");

    if state.board.read().await.mode == DataMode::Live {
        match chain.fetcher.fetch_missions().await {
            Ok(missions) => state.board.write().await.set_missions(missions),
            Err(e) => warn!(error = %e, "Failed to refresh missions after submit"),
        }
    }

    Ok(Json(SubmitResponse {
        hash: receipt.hash,
        ledger: receipt.ledger,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
