use std::sync::Arc;
use std::time::Duration;

use axum::{ routing::{ get, post }, Router };
use tower_http::{ cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer };

pub mod user;
pub mod wallet;
pub mod boost;
pub mod transaction;
pub mod referral;

use crate::services::{
    BalanceManager,
    ReconciliationService,
    ReferralService,
    TransactionService,
    UserService,
    WalletService,
};

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub wallet_service: Arc<WalletService>,
    pub balance_manager: Arc<BalanceManager>,
    pub transaction_service: Arc<TransactionService>,
    pub reconciliation_service: Arc<ReconciliationService>,
    pub referral_service: Arc<ReferralService>,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        wallet_service: Arc<WalletService>,
        balance_manager: Arc<BalanceManager>,
        transaction_service: Arc<TransactionService>,
        reconciliation_service: Arc<ReconciliationService>,
        referral_service: Arc<ReferralService>
    ) -> Self {
        Self {
            user_service,
            wallet_service,
            balance_manager,
            transaction_service,
            reconciliation_service,
            referral_service,
        }
    }
}

/// Every route, with tracing, CORS and a per-request timeout. A timed-out
/// request may still have committed; clients reconcile through history.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users/register", post(user::register))
        .route("/api/users/{id}", get(user::get_user))
        .route("/api/users/{id}/balance", get(wallet::get_balance))
        .route("/api/users/{id}/deposit", post(wallet::deposit))
        .route("/api/users/{id}/withdraw", post(wallet::withdraw))
        .route("/api/users/{id}/farming/deposit", post(wallet::deposit_uni_farming))
        .route("/api/users/{id}/boost", post(boost::purchase_boost))
        .route("/api/users/{id}/transactions", get(transaction::get_user_transactions))
        .route("/api/users/{id}/reconciliation", get(transaction::reconcile_user))
        .route("/api/users/{id}/referrals/income", get(referral::level_income))
        .route("/api/boost/packages", get(boost::list_packages))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}
