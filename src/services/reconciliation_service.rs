use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{ TransactionRepository, UserRepository };
use crate::enums::{ Currency, Direction };
use crate::error::{ AppError, Result };

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub user_id: i64,
    pub transactions: usize,
    pub ledger_uni: Decimal,
    pub ledger_ton: Decimal,
    pub balance_uni: Decimal,
    pub balance_ton: Decimal,
}

impl Reconciliation {
    /// Balance minus ledger sum. Non-zero after a clamped debit or an
    /// out-of-band correction.
    pub fn drift(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Uni => self.balance_uni - self.ledger_uni,
            Currency::Ton => self.balance_ton - self.ledger_ton,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift(Currency::Uni).is_zero() && self.drift(Currency::Ton).is_zero()
    }
}

/// Rebuilds balances from completed ledger rows.
pub struct ReconciliationService {
    users: Arc<UserRepository>,
    transactions: Arc<TransactionRepository>,
}

impl ReconciliationService {
    pub fn new(users: Arc<UserRepository>, transactions: Arc<TransactionRepository>) -> Self {
        Self { users, transactions }
    }

    pub async fn reconcile_user(&self, user_id: i64) -> Result<Reconciliation> {
        let user = self.users.find_by_id(user_id).await?.ok_or(AppError::UserNotFound(user_id))?;
        let rows = self.transactions.completed_for_user(user_id).await?;

        let mut ledger_uni = Decimal::ZERO;
        let mut ledger_ton = Decimal::ZERO;
        for row in &rows {
            let amount = match row.kind()?.direction() {
                Direction::Credit => row.amount()?,
                Direction::Debit => -row.amount()?,
            };
            match row.currency()? {
                Currency::Uni => {
                    ledger_uni += amount;
                }
                Currency::Ton => {
                    ledger_ton += amount;
                }
            }
        }

        let report = Reconciliation {
            user_id,
            transactions: rows.len(),
            ledger_uni,
            ledger_ton,
            balance_uni: user.balance(Currency::Uni)?,
            balance_ton: user.balance(Currency::Ton)?,
        };

        if !report.is_consistent() {
            tracing::warn!(
                user_id,
                drift_uni = %report.drift(Currency::Uni),
                drift_ton = %report.drift(Currency::Ton),
                "ledger does not match balance"
            );
        }

        Ok(report)
    }
}
