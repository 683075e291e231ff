use axum::{ extract::{ Path, State }, Json };

use crate::error::Result;
use crate::services::referral_service::ReferralIncome;

use super::AppState;

pub async fn level_income(
    State(state): State<AppState>,
    Path(user_id): Path<i64>
) -> Result<Json<ReferralIncome>> {
    let income = state.referral_service.level_income(user_id).await?;

    Ok(Json(income))
}
