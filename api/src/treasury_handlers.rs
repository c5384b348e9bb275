//! Treasury API Handlers

use crate::auth::{AdminWallet, EmergencySigner, Wallet};
use crate::extract::ValidatedJson;
use crate::{ApiError, ApiResult, ApiState};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use ece_treasury::constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_PAGE};
use ece_treasury::{
    BurnReceipt, EmergencyAction, EmergencyReceipt, LedgerTransaction, MintReceipt,
    OperationResult, PayoutHistory, PayoutReceipt, TransactionKind, TreasuryStatus,
    WeeklyPayoutRequest,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Weekly payout request body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayoutBody {
    pub revenue_amount: u64,
    pub payout_percentage: f64,
    #[validate(length(min = 1))]
    pub authorized_signers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyCommand {
    Pause,
    Unpause,
}

/// Emergency control request body
#[derive(Debug, Deserialize, Validate)]
pub struct EmergencyBody {
    pub action: EmergencyCommand,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MintBody {
    #[validate(range(min = 1))]
    pub usdc_amount: u64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BurnBody {
    #[validate(range(min = 1))]
    pub ece_amount: u64,
}

/// Platform revenue entry reported by a collaborator service
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RevenueBody {
    pub kind: TransactionKind,
    #[validate(length(min = 1, max = 64))]
    pub payer: String,
    #[validate(range(min = 1))]
    pub amount: u64,
    #[serde(default)]
    #[validate(length(max = 256))]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    DEFAULT_HISTORY_PAGE
}

fn default_limit() -> u64 {
    DEFAULT_HISTORY_LIMIT
}

#[derive(Debug, Serialize)]
pub struct EmergencyLog {
    pub actions: Vec<EmergencyAction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub paused_locally: bool,
}

type Outcome<T> = ApiResult<Json<OperationResult<T>>>;

fn ok<T>(data: T) -> Outcome<T> {
    Ok(Json(OperationResult::ok(data)))
}

/// Liveness probe
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_secs: state.started_at.elapsed().as_secs(),
        paused_locally: state.orchestrator.is_locally_paused(),
    })
}

/// Get the treasury dashboard snapshot
pub async fn get_treasury_status(
    State(state): State<ApiState>,
    AdminWallet(_admin): AdminWallet,
) -> Outcome<TreasuryStatus> {
    ok(state.reporter.treasury_status().await?)
}

/// Run the weekly revenue payout
pub async fn process_payout(
    State(state): State<ApiState>,
    AdminWallet(admin): AdminWallet,
    ValidatedJson(body): ValidatedJson<PayoutBody>,
) -> Outcome<PayoutReceipt> {
    tracing::info!(
        admin = %admin,
        revenue = body.revenue_amount,
        percentage = body.payout_percentage,
        "payout requested"
    );

    let receipt = state
        .orchestrator
        .process_weekly_payout(WeeklyPayoutRequest {
            revenue_amount: body.revenue_amount,
            payout_percentage: body.payout_percentage,
            authorized_signers: body.authorized_signers,
        })
        .await?;
    ok(receipt)
}

/// Get paginated payout history, newest first
pub async fn get_payout_history(
    State(state): State<ApiState>,
    AdminWallet(_admin): AdminWallet,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Outcome<PayoutHistory> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    ok(state.reporter.payout_history(query.page, query.limit).await?)
}

/// Pause or unpause treasury operations
pub async fn emergency_control(
    State(state): State<ApiState>,
    EmergencySigner(signer): EmergencySigner,
    ValidatedJson(body): ValidatedJson<EmergencyBody>,
) -> Outcome<EmergencyReceipt> {
    let receipt = match body.action {
        EmergencyCommand::Pause => {
            let reason = if body.reason.trim().is_empty() {
                "Emergency pause"
            } else {
                body.reason.trim()
            };
            state.orchestrator.emergency_pause(&signer, reason).await?
        }
        EmergencyCommand::Unpause => state.orchestrator.emergency_unpause(&signer).await?,
    };
    ok(receipt)
}

/// Get the emergency action audit log
pub async fn get_emergency_actions(
    State(state): State<ApiState>,
    AdminWallet(_admin): AdminWallet,
) -> Outcome<EmergencyLog> {
    let actions = state.reporter.emergency_actions().await?;
    ok(EmergencyLog { actions })
}

/// Mint ECE to the calling wallet against a USDC deposit
pub async fn mint(
    State(state): State<ApiState>,
    Wallet(wallet): Wallet,
    ValidatedJson(body): ValidatedJson<MintBody>,
) -> Outcome<MintReceipt> {
    ok(state
        .orchestrator
        .mint_ece_tokens(&wallet, body.usdc_amount)
        .await?)
}

/// Burn ECE from the calling wallet and redeem USDC
pub async fn burn(
    State(state): State<ApiState>,
    Wallet(wallet): Wallet,
    ValidatedJson(body): ValidatedJson<BurnBody>,
) -> Outcome<BurnReceipt> {
    ok(state
        .orchestrator
        .burn_ece_tokens(&wallet, body.ece_amount)
        .await?)
}

/// Record a platform revenue entry for the weekly aggregate
pub async fn record_revenue(
    State(state): State<ApiState>,
    AdminWallet(_admin): AdminWallet,
    ValidatedJson(body): ValidatedJson<RevenueBody>,
) -> Outcome<LedgerTransaction> {
    ok(state
        .orchestrator
        .record_revenue(body.kind, &body.payer, body.amount, &body.description)
        .await?)
}
