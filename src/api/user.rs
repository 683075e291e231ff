use axum::{ extract::{ Path, State }, http::StatusCode, Json };
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::db::user;
use crate::error::Result;

use super::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub telegram_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub referred_by: Option<i64>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub balance_uni: String,
    pub balance_ton: String,
    pub uni_deposit_amount: Option<String>,
    pub uni_farming_active: bool,
    pub ton_boost_package: Option<i32>,
    pub ton_boost_active: bool,
    pub referred_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            telegram_id: user.telegram_id,
            username: user.username,
            balance_uni: user.balance_uni,
            balance_ton: user.balance_ton,
            uni_deposit_amount: user.uni_deposit_amount,
            uni_farming_active: user.uni_farming_active,
            ton_boost_package: user.ton_boost_package,
            ton_boost_active: user.ton_boost_active,
            referred_by: user.referred_by,
            created_at: user.created_at,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>
) -> Result<(StatusCode, Json<UserResponse>)> {
    let registration = state.user_service.register(
        request.telegram_id,
        request.username,
        request.referred_by
    ).await?;

    let status = if registration.created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(registration.user.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>
) -> Result<Json<UserResponse>> {
    let user = state.user_service.get_user(user_id).await?;

    Ok(Json(user.into()))
}
