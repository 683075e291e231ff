use axum::{ extract::{ Path, State }, Json };
use serde::{ Deserialize, Serialize };

use crate::enums::Currency;
use crate::error::Result;
use crate::money::parse_input_amount;
use crate::services::wallet_service::{ FarmingDepositReceipt, WithdrawalReceipt };
use crate::services::{ Balances, TransactionOutcome };

use super::AppState;

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub currency: String,
    /// External transaction hash. Replays with the same hash are ignored.
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Deserialize)]
pub struct FarmingDepositRequest {
    pub amount: String,
}

#[derive(Serialize)]
pub struct DepositResponse {
    pub transaction_id: i64,
    pub duplicate: bool,
    pub balances: Balances,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<i64>
) -> Result<Json<Balances>> {
    let balances = state.balance_manager.get_balance(user_id).await?;

    Ok(Json(balances))
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<DepositRequest>
) -> Result<Json<DepositResponse>> {
    let amount = parse_input_amount(&request.amount)?;
    let currency: Currency = request.currency.parse()?;

    let outcome = state.wallet_service.deposit(user_id, amount, currency, request.tx_hash).await?;

    let response = match outcome {
        TransactionOutcome::Created(applied) =>
            DepositResponse {
                transaction_id: applied.transaction.id,
                duplicate: false,
                balances: applied.balances,
            },
        TransactionOutcome::Duplicate { existing } =>
            DepositResponse {
                transaction_id: existing.id,
                duplicate: true,
                balances: state.balance_manager.get_balance(user_id).await?,
            },
    };

    Ok(Json(response))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<WithdrawRequest>
) -> Result<Json<WithdrawalReceipt>> {
    let amount = parse_input_amount(&request.amount)?;
    let currency: Currency = request.currency.parse()?;

    let receipt = state.wallet_service.withdraw(
        user_id,
        amount,
        currency,
        request.wallet_address
    ).await?;

    Ok(Json(receipt))
}

pub async fn deposit_uni_farming(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<FarmingDepositRequest>
) -> Result<Json<FarmingDepositReceipt>> {
    let amount = parse_input_amount(&request.amount)?;

    let receipt = state.wallet_service.deposit_uni_farming(user_id, amount).await?;

    Ok(Json(receipt))
}
