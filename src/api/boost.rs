use axum::{ extract::{ Path, State }, Json };
use serde::Deserialize;

use crate::config::BoostPackage;
use crate::error::Result;
use crate::services::wallet_service::BoostPurchaseReceipt;

use super::AppState;

#[derive(Deserialize)]
pub struct PurchaseBoostRequest {
    pub package_id: i32,
}

pub async fn list_packages(State(state): State<AppState>) -> Json<Vec<BoostPackage>> {
    Json(state.wallet_service.packages().to_vec())
}

pub async fn purchase_boost(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<PurchaseBoostRequest>
) -> Result<Json<BoostPurchaseReceipt>> {
    let receipt = state.wallet_service.purchase_boost(user_id, request.package_id).await?;

    Ok(Json(receipt))
}
