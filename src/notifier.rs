use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{ Deserialize, Serialize };

use crate::enums::Currency;
use crate::error::Result;

/// Emitted after a ledger entry and its balance mutation have committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub user_id: i64,
    pub new_uni: Decimal,
    pub new_ton: Decimal,
    /// Signed: negative for debits.
    pub delta: Decimal,
    pub currency: Currency,
    /// Transaction kind that caused the change, e.g. `FARMING_REWARD`.
    pub source: String,
}

/// Outbound push of balance changes to connected clients.
///
/// Delivery is fire-and-forget. Callers log an `Err` and move on; it never
/// rolls back the committed change.
#[async_trait]
pub trait BalanceNotifier: Send + Sync {
    async fn notify_balance_change(&self, change: BalanceChange) -> Result<()>;
}

/// Writes every event to the structured log.
pub struct TracingNotifier;

#[async_trait]
impl BalanceNotifier for TracingNotifier {
    async fn notify_balance_change(&self, change: BalanceChange) -> Result<()> {
        tracing::info!(
            user_id = change.user_id,
            currency = %change.currency,
            delta = %change.delta,
            new_uni = %change.new_uni,
            new_ton = %change.new_ton,
            source = %change.source,
            "balance changed"
        );
        Ok(())
    }
}
