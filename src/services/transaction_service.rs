use std::sync::Arc;

use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use sea_orm::{ ConnectionTrait, DatabaseConnection, TransactionTrait };
use serde::Serialize;
use serde_json::{ Map, Value };

use crate::db::{ transaction, NewTransaction, TransactionFilter, TransactionRepository, UserRepository };
use crate::enums::{ Currency, DebitPolicy, Direction, StoredTxType, TransactionKind, TxStatus };
use crate::error::{ AppError, Result };
use crate::money::{ ensure_positive, fits_ledger_scale, AMOUNT_SCALE };
use crate::notifier::{ BalanceChange, BalanceNotifier };

use super::balance_manager::{ BalanceManager, Balances };

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub user_id: i64,
    pub kind: TransactionKind,
    /// Always positive; the sign comes from `kind`.
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub metadata: Map<String, Value>,
    /// Idempotency key, unique per user. A replay is a no-op.
    pub dedup_key: Option<String>,
    pub source_user_id: Option<i64>,
    pub debit_policy: DebitPolicy,
}

impl CreateTransactionRequest {
    pub fn new(user_id: i64, kind: TransactionKind, amount: Decimal, currency: Currency) -> Self {
        Self {
            user_id,
            kind,
            amount,
            currency,
            description: String::new(),
            metadata: Map::new(),
            dedup_key: None,
            source_user_id: None,
            debit_policy: DebitPolicy::Strict,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn source_user(mut self, user_id: i64) -> Self {
        self.source_user_id = Some(user_id);
        self
    }

    /// Floor the balance at zero instead of refusing an overdraw. Only for
    /// internal corrections, never for user-initiated debits.
    pub fn clamp_debit(mut self) -> Self {
        self.debit_policy = DebitPolicy::Clamp;
        self
    }

    fn validate(&self) -> Result<()> {
        ensure_positive(self.amount)?;
        if !fits_ledger_scale(self.amount) {
            return Err(
                AppError::InvalidInput(
                    format!("Amount {} has more than {} decimal places", self.amount, AMOUNT_SCALE)
                )
            );
        }
        if let Some(key) = &self.dedup_key {
            if key.trim().is_empty() {
                return Err(AppError::InvalidInput("Dedup key cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// A ledger row together with the balances it produced.
#[derive(Debug, Clone)]
pub struct AppliedTransaction {
    pub transaction: transaction::Model,
    pub kind: TransactionKind,
    pub currency: Currency,
    pub amount: Decimal,
    pub balances: Balances,
}

impl AppliedTransaction {
    /// Signed change to the balance of `currency`.
    pub fn delta(&self) -> Decimal {
        match self.kind.direction() {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    Created(AppliedTransaction),
    /// The dedup key was already used by this user. Nothing was written.
    Duplicate {
        existing: transaction::Model,
    },
}

impl TransactionOutcome {
    pub fn transaction(&self) -> &transaction::Model {
        match self {
            TransactionOutcome::Created(applied) => &applied.transaction,
            TransactionOutcome::Duplicate { existing } => existing,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, TransactionOutcome::Duplicate { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub stored_type: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TxStatus,
    pub description: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<transaction::Model> for TransactionView {
    type Error = AppError;

    fn try_from(row: transaction::Model) -> Result<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind()?,
            amount: row.amount()?,
            currency: row.currency()?,
            status: row.status()?,
            metadata: Value::Object(row.metadata_map()),
            stored_type: row.tx_type,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub items: Vec<TransactionView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// The single entry point for moving money. Appends the ledger row, applies
/// the balance mutation, then notifies.
pub struct TransactionService {
    db: DatabaseConnection,
    users: Arc<UserRepository>,
    transactions: Arc<TransactionRepository>,
    balances: Arc<BalanceManager>,
    notifier: Arc<dyn BalanceNotifier>,
}

impl TransactionService {
    pub fn new(
        db: DatabaseConnection,
        users: Arc<UserRepository>,
        transactions: Arc<TransactionRepository>,
        balances: Arc<BalanceManager>,
        notifier: Arc<dyn BalanceNotifier>
    ) -> Self {
        Self {
            db,
            users,
            transactions,
            balances,
            notifier,
        }
    }

    /// Runs [`apply`](Self::apply) in its own database transaction and
    /// notifies once it has committed.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = request.user_id, kind = %request.kind, amount = %request.amount)
    )]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest
    ) -> Result<TransactionOutcome> {
        let txn = self.db.begin().await?;
        let outcome = self.apply(&txn, request).await?;
        txn.commit().await?;

        if let TransactionOutcome::Created(applied) = &outcome {
            self.publish(applied).await;
        }

        Ok(outcome)
    }

    /// Insert the ledger row and mutate the balance on `conn`. The caller
    /// owns the database transaction and must call [`publish`](Self::publish)
    /// after it commits.
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: CreateTransactionRequest
    ) -> Result<TransactionOutcome> {
        request.validate()?;

        // Serializes writers for this user until the caller commits
        let user = self.users.lock(conn, request.user_id).await?;

        if let Some(key) = &request.dedup_key {
            if let Some(existing) = self.transactions.find_by_dedup_key(conn, user.id, key).await? {
                tracing::info!(
                    user_id = user.id,
                    dedup_key = %key,
                    existing_id = existing.id,
                    "duplicate transaction ignored"
                );
                return Ok(TransactionOutcome::Duplicate { existing });
            }
        }

        let direction = request.kind.direction();
        if direction == Direction::Debit && request.debit_policy == DebitPolicy::Strict {
            let available = user.balance(request.currency)?;
            if available < request.amount {
                return Err(AppError::InsufficientBalance {
                    currency: request.currency,
                    available,
                    required: request.amount,
                });
            }
        }

        let mut metadata = request.metadata;
        metadata.insert("original_type".to_string(), Value::from(request.kind.as_str()));
        if let Some(key) = &request.dedup_key {
            metadata.entry("dedup_key".to_string()).or_insert_with(|| Value::from(key.as_str()));
        }
        let metadata = serde_json
            ::to_string(&Value::Object(metadata))
            .map_err(|e| AppError::Internal(format!("Failed to encode metadata: {}", e)))?;

        let description = if request.description.is_empty() {
            Self::default_description(request.kind, request.amount, request.currency)
        } else {
            request.description
        };

        let row = self.transactions.insert(conn, NewTransaction {
            user_id: user.id,
            tx_type: request.kind.storage_type(),
            amount: request.amount,
            currency: request.currency,
            status: TxStatus::Completed,
            description,
            metadata,
            dedup_key: request.dedup_key,
            source_user_id: request.source_user_id,
        }).await?;

        let (uni, ton) = match request.currency {
            Currency::Uni => (request.amount, Decimal::ZERO),
            Currency::Ton => (Decimal::ZERO, request.amount),
        };
        let balances = match direction {
            Direction::Credit => self.balances.add_balance(conn, user.id, uni, ton).await?,
            Direction::Debit =>
                self.balances.subtract_balance(
                    conn,
                    user.id,
                    uni,
                    ton,
                    request.debit_policy
                ).await?,
        };

        tracing::info!(
            user_id = user.id,
            transaction_id = row.id,
            kind = %request.kind,
            amount = %request.amount,
            currency = %request.currency,
            "transaction recorded"
        );

        Ok(
            TransactionOutcome::Created(AppliedTransaction {
                transaction: row,
                kind: request.kind,
                currency: request.currency,
                amount: request.amount,
                balances,
            })
        )
    }

    /// Fire-and-forget. A failed delivery is logged, never propagated.
    pub async fn publish(&self, applied: &AppliedTransaction) {
        let change = BalanceChange {
            user_id: applied.transaction.user_id,
            new_uni: applied.balances.uni,
            new_ton: applied.balances.ton,
            delta: applied.delta(),
            currency: applied.currency,
            source: applied.kind.as_str().to_string(),
        };

        if let Err(e) = self.notifier.notify_balance_change(change).await {
            tracing::warn!(
                user_id = applied.transaction.user_id,
                transaction_id = applied.transaction.id,
                error = %e,
                "balance notification failed"
            );
        }
    }

    /// Newest first. `page` starts at 1.
    pub async fn list_user_transactions(
        &self,
        user_id: i64,
        filter: TransactionFilter,
        page: Option<u64>,
        limit: Option<u64>
    ) -> Result<TransactionPage> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(AppError::UserNotFound(user_id));
        }

        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        // Offsets are bound as signed 64-bit integers
        let offset = (page - 1)
            .checked_mul(limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| AppError::InvalidInput(format!("Page {} is out of range", page)))?;

        let rows = self.transactions.find_by_user_id(user_id, &filter, limit, offset).await?;
        let total = self.transactions.count_by_user_id(user_id, &filter).await?;

        let items = rows
            .into_iter()
            .map(TransactionView::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(TransactionPage {
            items,
            total,
            page,
            limit,
        })
    }

    fn default_description(kind: TransactionKind, amount: Decimal, currency: Currency) -> String {
        match kind {
            TransactionKind::FarmingReward => format!("UNI farming income {} {}", amount, currency),
            TransactionKind::BoostIncome => format!("TON boost income {} {}", amount, currency),
            TransactionKind::ReferralReward => format!("Referral reward {} {}", amount, currency),
            TransactionKind::Deposit => format!("Deposit {} {}", amount, currency),
            TransactionKind::Withdrawal => format!("Withdrawal {} {}", amount, currency),
            TransactionKind::WithdrawalFee => format!("Withdrawal fee {} {}", amount, currency),
            TransactionKind::BoostPurchase => format!("Boost purchase {} {}", amount, currency),
            TransactionKind::FarmingDeposit => format!("UNI farming deposit {} {}", amount, currency),
            _ => format!("{} {} {}", kind, amount, currency),
        }
    }
}

/// Parse a `?type=` filter. Accepts either a stored type or a domain kind.
pub fn parse_type_filter(raw: &str) -> Result<StoredTxType> {
    match raw.parse::<StoredTxType>() {
        Ok(stored) => Ok(stored),
        Err(_) => Ok(raw.parse::<TransactionKind>()?.storage_type()),
    }
}
