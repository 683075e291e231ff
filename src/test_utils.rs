//! Shared test utilities.
//!
//! Builds the full service graph on an in-memory SQLite database migrated
//! with the real [`migration::Migrator`], plus helpers for seeding users.

use std::sync::{ Arc, Mutex };

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use sea_orm::{ DatabaseConnection, Set };
use sea_orm_migration::MigratorTrait;

use crate::config::{ AccrualConfig, BoostPackage, ReferralConfig };
use crate::db::{ user, TransactionRepository, UserRepository };
use crate::error::{ AppError, Result };
use crate::notifier::{ BalanceChange, BalanceNotifier };
use crate::scheduler::AccrualScheduler;
use crate::services::{
    BalanceManager,
    FarmingService,
    ReconciliationService,
    ReferralService,
    TransactionService,
    UserService,
    WalletService,
};

/// Creates an in-memory `SQLite` database with all tables migrated.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Captures every event for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BalanceChange>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<BalanceChange> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn events_for(&self, user_id: i64) -> Vec<BalanceChange> {
        self.events()
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl BalanceNotifier for RecordingNotifier {
    async fn notify_balance_change(&self, change: BalanceChange) -> Result<()> {
        match self.events.lock() {
            Ok(mut events) => events.push(change),
            Err(poisoned) => poisoned.into_inner().push(change),
        }
        Ok(())
    }
}

/// Always fails, to check delivery errors never roll anything back.
pub struct FailingNotifier;

#[async_trait]
impl BalanceNotifier for FailingNotifier {
    async fn notify_balance_change(&self, _change: BalanceChange) -> Result<()> {
        Err(AppError::Internal("notification channel closed".to_string()))
    }
}

/// Every service wired together the way `main` does it.
pub struct TestLedger {
    pub db: DatabaseConnection,
    pub users: Arc<UserRepository>,
    pub rows: Arc<TransactionRepository>,
    pub balances: Arc<BalanceManager>,
    pub transactions: Arc<TransactionService>,
    pub referrals: Arc<ReferralService>,
    pub farming: Arc<FarmingService>,
    pub wallet: Arc<WalletService>,
    pub accounts: Arc<UserService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub scheduler: Arc<AccrualScheduler>,
    pub notifier: Arc<RecordingNotifier>,
    accrual: AccrualConfig,
}

impl TestLedger {
    pub fn wallet_with_fee(&self, withdrawal_fee_ton: Decimal) -> WalletService {
        self.wallet_with(BoostPackage::defaults(), withdrawal_fee_ton)
    }

    pub fn wallet_with(&self, packages: Vec<BoostPackage>, withdrawal_fee_ton: Decimal) -> WalletService {
        WalletService::new(
            self.db.clone(),
            self.users.clone(),
            self.transactions.clone(),
            packages,
            withdrawal_fee_ton,
            self.accrual.uni_daily_rate
        )
    }
}

pub async fn setup_test_ledger() -> Result<TestLedger> {
    setup_test_ledger_with(ReferralConfig::default(), AccrualConfig::default()).await
}

pub async fn setup_test_ledger_with(
    referral: ReferralConfig,
    accrual: AccrualConfig
) -> Result<TestLedger> {
    let notifier = Arc::new(RecordingNotifier::default());
    build_ledger(setup_test_db().await?, referral, accrual, notifier.clone(), notifier)
}

/// Same graph, but every notification fails.
pub async fn setup_test_ledger_with_failing_notifier() -> Result<TestLedger> {
    build_ledger(
        setup_test_db().await?,
        ReferralConfig::default(),
        AccrualConfig::default(),
        Arc::new(FailingNotifier),
        Arc::new(RecordingNotifier::default())
    )
}

fn build_ledger(
    db: DatabaseConnection,
    referral: ReferralConfig,
    accrual: AccrualConfig,
    notifier: Arc<dyn BalanceNotifier>,
    recorder: Arc<RecordingNotifier>
) -> Result<TestLedger> {
    referral.validate().map_err(AppError::Config)?;

    let users = Arc::new(UserRepository::new(db.clone()));
    let rows = Arc::new(TransactionRepository::new(db.clone()));
    let balances = Arc::new(BalanceManager::new(users.clone()));
    let transactions = Arc::new(
        TransactionService::new(db.clone(), users.clone(), rows.clone(), balances.clone(), notifier)
    );
    let referrals = Arc::new(
        ReferralService::new(users.clone(), rows.clone(), transactions.clone(), referral)
    );
    let farming = Arc::new(
        FarmingService::new(
            db.clone(),
            users.clone(),
            transactions.clone(),
            referrals.clone(),
            accrual.clone()
        )
    );
    let wallet = Arc::new(
        WalletService::new(
            db.clone(),
            users.clone(),
            transactions.clone(),
            BoostPackage::defaults(),
            Decimal::ZERO,
            accrual.uni_daily_rate
        )
    );
    let accounts = Arc::new(UserService::new(db.clone(), users.clone()));
    let reconciliation = Arc::new(ReconciliationService::new(users.clone(), rows.clone()));
    let scheduler = Arc::new(
        AccrualScheduler::new(
            users.clone(),
            farming.clone(),
            tokio::time::Duration::from_secs(accrual.interval_secs)
        )
    );

    Ok(TestLedger {
        db,
        users,
        rows,
        balances,
        transactions,
        referrals,
        farming,
        wallet,
        accounts,
        reconciliation,
        scheduler,
        notifier: recorder,
        accrual,
    })
}

/// 2025-01-01T00:00:00Z. Whole seconds so timestamps survive storage exactly.
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

pub async fn create_test_user(db: &DatabaseConnection, telegram_id: i64) -> Result<user::Model> {
    UserRepository::new(db.clone()).create(db, telegram_id, None, None).await
}

pub async fn create_referred_user(
    db: &DatabaseConnection,
    telegram_id: i64,
    referrer_id: i64
) -> Result<user::Model> {
    UserRepository::new(db.clone()).create(db, telegram_id, None, Some(referrer_id)).await
}

/// Users linked bottom-up: `chain[i]` was referred by `chain[i - 1]`.
/// The last element is the deepest user.
pub async fn create_referral_chain(
    db: &DatabaseConnection,
    length: usize
) -> Result<Vec<user::Model>> {
    let mut chain: Vec<user::Model> = Vec::with_capacity(length);
    for i in 0..length {
        let telegram_id = 10_000 + (i as i64);
        let user = match chain.last() {
            Some(parent) => create_referred_user(db, telegram_id, parent.id).await?,
            None => create_test_user(db, telegram_id).await?,
        };
        chain.push(user);
    }
    Ok(chain)
}

/// Apply `change` to the stored row directly, bypassing the services.
pub async fn update_user<F>(db: &DatabaseConnection, user_id: i64, change: F) -> Result<user::Model>
    where F: FnOnce(&mut user::ActiveModel)
{
    let repo = UserRepository::new(db.clone());
    let existing = repo.get(db, user_id).await?;
    let mut model: user::ActiveModel = existing.into();
    change(&mut model);
    repo.save(db, model).await
}

/// Out-of-band balance seed. Not recorded in the ledger.
pub async fn set_balances(
    db: &DatabaseConnection,
    user_id: i64,
    uni: &str,
    ton: &str
) -> Result<user::Model> {
    update_user(db, user_id, |m| {
        m.balance_uni = Set(uni.to_string());
        m.balance_ton = Set(ton.to_string());
    }).await
}

pub async fn start_uni_farming(
    db: &DatabaseConnection,
    user_id: i64,
    deposit: &str,
    daily_rate: &str,
    at: DateTime<Utc>
) -> Result<user::Model> {
    update_user(db, user_id, |m| {
        m.uni_deposit_amount = Set(Some(deposit.to_string()));
        m.uni_farming_rate = Set(Some(daily_rate.to_string()));
        m.uni_farming_active = Set(true);
        m.uni_farming_start = Set(Some(at));
        m.uni_farming_last_update = Set(Some(at));
    }).await
}

pub async fn start_ton_boost(
    db: &DatabaseConnection,
    user_id: i64,
    deposit: &str,
    daily_rate: &str,
    at: DateTime<Utc>
) -> Result<user::Model> {
    update_user(db, user_id, |m| {
        m.ton_boost_package = Set(Some(1));
        m.ton_boost_deposit = Set(Some(deposit.to_string()));
        m.ton_boost_rate = Set(Some(daily_rate.to_string()));
        m.ton_boost_active = Set(true);
        m.ton_boost_start = Set(Some(at));
        m.ton_boost_last_update = Set(Some(at));
    }).await
}
