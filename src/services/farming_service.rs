use std::fmt;
use std::sync::Arc;

use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use sea_orm::{ ConnectionTrait, DatabaseConnection, TransactionTrait };

use crate::config::AccrualConfig;
use crate::db::{ user, UserRepository };
use crate::enums::{ Currency, TransactionKind };
use crate::error::Result;
use crate::money::{ parse_stored, round_amount, SECONDS_PER_DAY };

use super::referral_service::ReferralService;
use super::transaction_service::{ CreateTransactionRequest, TransactionOutcome, TransactionService };

/// The two yield positions a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccrualStream {
    /// UNI deposit earning UNI.
    UniFarming,
    /// TON boost package earning TON.
    TonBoost,
}

impl AccrualStream {
    pub fn currency(&self) -> Currency {
        match self {
            AccrualStream::UniFarming => Currency::Uni,
            AccrualStream::TonBoost => Currency::Ton,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            AccrualStream::UniFarming => TransactionKind::FarmingReward,
            AccrualStream::TonBoost => TransactionKind::BoostIncome,
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            AccrualStream::UniFarming => "uni_farming",
            AccrualStream::TonBoost => "ton_boost",
        }
    }

    /// Dedup key of the window that starts at `cursor`.
    pub fn dedup_key(&self, user_id: i64, cursor: DateTime<Utc>) -> String {
        format!("{}:{}:{}", self.key_prefix(), user_id, cursor.timestamp_millis())
    }
}

impl fmt::Display for AccrualStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_prefix())
    }
}

/// Snapshot of one stream's columns on a user row.
struct Position {
    active: bool,
    cursor: Option<DateTime<Utc>>,
    deposit: Option<Decimal>,
    rate: Option<Decimal>,
}

impl Position {
    fn read(user: &user::Model, stream: AccrualStream) -> Result<Self> {
        let (active, cursor, deposit, rate) = match stream {
            AccrualStream::UniFarming =>
                (
                    user.uni_farming_active,
                    user.uni_farming_last_update.or(user.uni_farming_start),
                    user.uni_deposit_amount.as_deref(),
                    user.uni_farming_rate.as_deref(),
                ),
            AccrualStream::TonBoost =>
                (
                    user.ton_boost_active,
                    user.ton_boost_last_update.or(user.ton_boost_start),
                    user.ton_boost_deposit.as_deref(),
                    user.ton_boost_rate.as_deref(),
                ),
        };

        Ok(Self {
            active,
            cursor,
            deposit: Self::optional(deposit)?,
            rate: Self::optional(rate)?,
        })
    }

    fn optional(raw: Option<&str>) -> Result<Option<Decimal>> {
        match raw {
            Some(value) if !value.trim().is_empty() => Ok(Some(parse_stored(value)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    /// Yield credited and the cursor moved to `now`.
    Paid {
        transaction_id: i64,
        amount: Decimal,
        commissions: usize,
        commission_failures: usize,
    },
    /// Yield was zero or under the payout minimum. Cursor still moved.
    BelowMinimum {
        amount: Decimal,
    },
    /// This window was already paid, e.g. by a concurrent process. Cursor moved.
    AlreadyPaid,
    /// Active position without any timestamp. Cursor set to `now`.
    CursorInitialized,
    /// `now` is not after the cursor.
    NothingElapsed,
    Inactive,
}

/// Per-user accrual of farming and boost yield.
pub struct FarmingService {
    db: DatabaseConnection,
    users: Arc<UserRepository>,
    transactions: Arc<TransactionService>,
    referrals: Arc<ReferralService>,
    config: AccrualConfig,
}

impl FarmingService {
    pub fn new(
        db: DatabaseConnection,
        users: Arc<UserRepository>,
        transactions: Arc<TransactionService>,
        referrals: Arc<ReferralService>,
        config: AccrualConfig
    ) -> Self {
        Self {
            db,
            users,
            transactions,
            referrals,
            config,
        }
    }

    /// Pay the yield owed on `stream` for `(cursor, now]`.
    ///
    /// The user row is locked, the ledger row is written and the cursor is
    /// advanced in one database transaction, so running this twice for the
    /// same `now` pays once. Commission propagation runs after commit.
    #[tracing::instrument(skip(self), fields(stream = %stream))]
    pub async fn accrue(
        &self,
        user_id: i64,
        stream: AccrualStream,
        now: DateTime<Utc>
    ) -> Result<AccrualOutcome> {
        let txn = self.db.begin().await?;
        let user = self.users.lock(&txn, user_id).await?;
        let position = Position::read(&user, stream)?;

        if !position.active {
            txn.rollback().await?;
            return Ok(AccrualOutcome::Inactive);
        }

        let Some(cursor) = position.cursor else {
            self.advance(&txn, stream, user, now).await?;
            txn.commit().await?;
            tracing::info!(user_id, "accrual cursor initialized");
            return Ok(AccrualOutcome::CursorInitialized);
        };

        let elapsed_ms = (now - cursor).num_milliseconds();
        if elapsed_ms <= 0 {
            txn.rollback().await?;
            return Ok(AccrualOutcome::NothingElapsed);
        }

        let deposit = position.deposit.unwrap_or_else(|| {
            tracing::warn!(user_id, "active position has no deposit amount, treating as zero");
            Decimal::ZERO
        });
        let rate = position.rate.unwrap_or_else(|| {
            tracing::warn!(user_id, "active position has no rate, treating as zero");
            Decimal::ZERO
        });

        let amount = Self::yield_for(deposit, rate, elapsed_ms);

        if amount.is_zero() || amount < self.config.min_amount {
            self.advance(&txn, stream, user, now).await?;
            txn.commit().await?;
            tracing::debug!(user_id, amount = %amount, "yield below payout minimum");
            return Ok(AccrualOutcome::BelowMinimum { amount });
        }

        let elapsed = Decimal::new(elapsed_ms, 3);
        let request = CreateTransactionRequest::new(
            user.id,
            stream.kind(),
            amount,
            stream.currency()
        )
            .dedup_key(stream.dedup_key(user.id, cursor))
            .meta("period_start", cursor.to_rfc3339())
            .meta("period_end", now.to_rfc3339())
            .meta("elapsed_seconds", elapsed.normalize().to_string())
            .meta("deposit", deposit.to_string())
            .meta("rate", rate.to_string());

        let outcome = self.transactions.apply(&txn, request).await?;
        self.advance(&txn, stream, user, now).await?;
        txn.commit().await?;

        let applied = match outcome {
            TransactionOutcome::Created(applied) => applied,
            TransactionOutcome::Duplicate { .. } => {
                return Ok(AccrualOutcome::AlreadyPaid);
            }
        };
        self.transactions.publish(&applied).await;

        let (commissions, commission_failures) = match
            self.referrals.propagate(
                user_id,
                amount,
                stream.currency(),
                Some(applied.transaction.id)
            ).await
        {
            Ok(report) => (report.paid.len(), report.failures.len()),
            Err(e) => {
                tracing::error!(user_id, error = %e, "referral propagation failed");
                (0, 1)
            }
        };

        Ok(AccrualOutcome::Paid {
            transaction_id: applied.transaction.id,
            amount,
            commissions,
            commission_failures,
        })
    }

    /// `deposit * daily_rate * elapsed / day`, truncated to ledger precision.
    pub fn yield_for(deposit: Decimal, daily_rate: Decimal, elapsed_ms: i64) -> Decimal {
        if elapsed_ms <= 0 {
            return Decimal::ZERO;
        }
        let elapsed = Decimal::new(elapsed_ms, 3);
        round_amount((deposit * daily_rate * elapsed) / Decimal::from(SECONDS_PER_DAY))
    }

    async fn advance<C: ConnectionTrait>(
        &self,
        conn: &C,
        stream: AccrualStream,
        user: user::Model,
        now: DateTime<Utc>
    ) -> Result<()> {
        match stream {
            AccrualStream::UniFarming => self.users.set_farming_cursor(conn, user, now).await?,
            AccrualStream::TonBoost => self.users.set_boost_cursor(conn, user, now).await?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::test_utils::{ create_test_user, fixed_time, setup_test_ledger, start_uni_farming, update_user };

    #[test]
    fn five_minutes_of_one_percent_on_a_thousand() {
        let amount = FarmingService::yield_for(Decimal::from(1000), Decimal::new(1, 2), 300_000);
        assert_eq!(amount, Decimal::new(3472222, 8));
    }

    #[test]
    fn no_elapsed_time_yields_nothing() {
        assert_eq!(FarmingService::yield_for(Decimal::from(1000), Decimal::ONE, 0), Decimal::ZERO);
        assert_eq!(FarmingService::yield_for(Decimal::from(1000), Decimal::ONE, -5), Decimal::ZERO);
    }

    #[tokio::test]
    async fn zero_deposit_advances_cursor_without_a_transaction() {
        let ledger = setup_test_ledger().await.unwrap();
        let user = create_test_user(&ledger.db, 1).await.unwrap();
        let start = fixed_time();
        start_uni_farming(&ledger.db, user.id, "0", "0.01", start).await.unwrap();

        let now = start + Duration::seconds(300);
        let outcome = ledger.farming.accrue(user.id, AccrualStream::UniFarming, now).await.unwrap();

        assert_eq!(outcome, AccrualOutcome::BelowMinimum { amount: Decimal::ZERO });
        let reloaded = ledger.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.uni_farming_last_update, Some(now));
        assert!(ledger.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn missing_cursor_is_initialized_first() {
        let ledger = setup_test_ledger().await.unwrap();
        let user = create_test_user(&ledger.db, 1).await.unwrap();
        update_user(&ledger.db, user.id, |m| {
            m.ton_boost_active = sea_orm::Set(true);
            m.ton_boost_deposit = sea_orm::Set(Some("10".to_string()));
            m.ton_boost_rate = sea_orm::Set(Some("0.01".to_string()));
        }).await.unwrap();

        let outcome = ledger.farming.accrue(user.id, AccrualStream::TonBoost, Utc::now()).await.unwrap();

        assert_eq!(outcome, AccrualOutcome::CursorInitialized);
    }

    #[tokio::test]
    async fn inactive_position_is_left_alone() {
        let ledger = setup_test_ledger().await.unwrap();
        let user = create_test_user(&ledger.db, 1).await.unwrap();

        let outcome = ledger.farming.accrue(user.id, AccrualStream::UniFarming, Utc::now()).await.unwrap();

        assert_eq!(outcome, AccrualOutcome::Inactive);
    }
}
