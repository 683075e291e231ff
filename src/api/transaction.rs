use axum::{ extract::{ Path, Query, State }, Json };
use serde::Deserialize;

use crate::db::TransactionFilter;
use crate::enums::{ Currency, TxStatus };
use crate::error::Result;
use crate::services::reconciliation_service::Reconciliation;
use crate::services::transaction_service::{ parse_type_filter, TransactionPage };

use super::AppState;

#[derive(Deserialize)]
pub struct TransactionQueryParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
}

impl TransactionQueryParams {
    fn filter(&self) -> Result<TransactionFilter> {
        Ok(TransactionFilter {
            currency: self.currency.as_deref().map(str::parse::<Currency>).transpose()?,
            status: self.status.as_deref().map(str::parse::<TxStatus>).transpose()?,
            tx_type: self.tx_type.as_deref().map(parse_type_filter).transpose()?,
        })
    }
}

pub async fn get_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<TransactionQueryParams>
) -> Result<Json<TransactionPage>> {
    let filter = params.filter()?;

    let page = state.transaction_service.list_user_transactions(
        user_id,
        filter,
        params.page,
        params.limit
    ).await?;

    Ok(Json(page))
}

pub async fn reconcile_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>
) -> Result<Json<Reconciliation>> {
    let report = state.reconciliation_service.reconcile_user(user_id).await?;

    Ok(Json(report))
}
