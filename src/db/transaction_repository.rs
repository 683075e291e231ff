use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::NotSet,
    ColumnTrait,
    ConnectionTrait,
    DatabaseConnection,
    EntityTrait,
    PaginatorTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
    Select,
    Set,
};

use crate::db::entity::{ transaction, Transaction };
use crate::enums::{ Currency, StoredTxType, TxStatus };
use crate::error::Result;
use crate::money::to_stored;

/// A row about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub tx_type: StoredTxType,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TxStatus,
    pub description: String,
    pub metadata: String,
    pub dedup_key: Option<String>,
    pub source_user_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub currency: Option<Currency>,
    pub status: Option<TxStatus>,
    pub tx_type: Option<StoredTxType>,
}

impl TransactionFilter {
    fn apply(&self, mut query: Select<Transaction>) -> Select<Transaction> {
        if let Some(currency) = self.currency {
            query = query.filter(transaction::Column::Currency.eq(currency.as_str()));
        }
        if let Some(status) = self.status {
            query = query.filter(transaction::Column::Status.eq(status.as_str()));
        }
        if let Some(tx_type) = self.tx_type {
            query = query.filter(transaction::Column::TxType.eq(tx_type.as_str()));
        }
        query
    }
}

/// Append-only access to the `transactions` table. Nothing here updates or
/// deletes a row.
pub struct TransactionRepository {
    db: DatabaseConnection,
}

impl TransactionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        new: NewTransaction
    ) -> Result<transaction::Model> {
        let row = transaction::ActiveModel {
            id: NotSet,
            user_id: Set(new.user_id),
            tx_type: Set(new.tx_type.as_str().to_string()),
            amount: Set(to_stored(new.amount)),
            currency: Set(new.currency.as_str().to_string()),
            status: Set(new.status.as_str().to_string()),
            description: Set(new.description),
            metadata: Set(new.metadata),
            dedup_key: Set(new.dedup_key),
            source_user_id: Set(new.source_user_id),
            created_at: Set(Utc::now()),
        };

        let row = row.insert(conn).await?;
        Ok(row)
    }

    pub async fn find_by_dedup_key<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        dedup_key: &str
    ) -> Result<Option<transaction::Model>> {
        let row = Transaction::find()
            .filter(transaction::Column::UserId.eq(user_id))
            .filter(transaction::Column::DedupKey.eq(dedup_key))
            .one(conn).await?;
        Ok(row)
    }

    /// Newest first.
    pub async fn find_by_user_id(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
        limit: u64,
        offset: u64
    ) -> Result<Vec<transaction::Model>> {
        let query = filter.apply(
            Transaction::find().filter(transaction::Column::UserId.eq(user_id))
        );

        let rows = query
            .order_by_desc(transaction::Column::CreatedAt)
            .order_by_desc(transaction::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.db).await?;

        Ok(rows)
    }

    pub async fn count_by_user_id(&self, user_id: i64, filter: &TransactionFilter) -> Result<u64> {
        let total = filter
            .apply(Transaction::find().filter(transaction::Column::UserId.eq(user_id)))
            .count(&self.db).await?;
        Ok(total)
    }

    /// Every completed row for the user, oldest first. Legacy rows marked
    /// `confirmed` count as completed.
    pub async fn completed_for_user(&self, user_id: i64) -> Result<Vec<transaction::Model>> {
        let rows = Transaction::find()
            .filter(transaction::Column::UserId.eq(user_id))
            .filter(transaction::Column::Status.is_in([TxStatus::Completed.as_str(), "confirmed"]))
            .order_by_asc(transaction::Column::Id)
            .all(&self.db).await?;
        Ok(rows)
    }

    /// Completed referral commissions credited to `user_id`, oldest first.
    pub async fn referral_rewards_for_user(&self, user_id: i64) -> Result<Vec<transaction::Model>> {
        let rows = Transaction::find()
            .filter(transaction::Column::UserId.eq(user_id))
            .filter(transaction::Column::TxType.eq(StoredTxType::ReferralReward.as_str()))
            .filter(transaction::Column::Status.is_in([TxStatus::Completed.as_str(), "confirmed"]))
            .order_by_asc(transaction::Column::Id)
            .all(&self.db).await?;
        Ok(rows)
    }
}
