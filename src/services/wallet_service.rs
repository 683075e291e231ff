use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ DatabaseConnection, Set, TransactionTrait };
use serde::Serialize;

use crate::config::BoostPackage;
use crate::db::{ user, UserRepository };
use crate::enums::{ Currency, TransactionKind };
use crate::error::{ AppError, Result };
use crate::money::{ ensure_positive, to_stored };

use super::balance_manager::Balances;
use super::transaction_service::{
    AppliedTransaction,
    CreateTransactionRequest,
    TransactionOutcome,
    TransactionService,
};

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub transaction_id: i64,
    pub fee_transaction_id: Option<i64>,
    pub amount: Decimal,
    pub fee: Decimal,
    pub currency: Currency,
    pub balances: Balances,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoostPurchaseReceipt {
    pub package: BoostPackage,
    pub transaction_id: i64,
    /// `None` for packages without a UNI bonus.
    pub bonus_transaction_id: Option<i64>,
    pub boost_deposit: Decimal,
    pub balances: Balances,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmingDepositReceipt {
    pub transaction_id: i64,
    pub deposit_total: Decimal,
    pub balances: Balances,
}

/// User-initiated money movements: deposits, withdrawals, farming deposits
/// and boost purchases. Every debit here is strict.
pub struct WalletService {
    db: DatabaseConnection,
    users: Arc<UserRepository>,
    transactions: Arc<TransactionService>,
    packages: Vec<BoostPackage>,
    withdrawal_fee_ton: Decimal,
    uni_daily_rate: Decimal,
}

impl WalletService {
    pub fn new(
        db: DatabaseConnection,
        users: Arc<UserRepository>,
        transactions: Arc<TransactionService>,
        packages: Vec<BoostPackage>,
        withdrawal_fee_ton: Decimal,
        uni_daily_rate: Decimal
    ) -> Self {
        Self {
            db,
            users,
            transactions,
            packages,
            withdrawal_fee_ton,
            uni_daily_rate,
        }
    }

    pub fn packages(&self) -> &[BoostPackage] {
        &self.packages
    }

    /// Credit an external deposit. A repeated `tx_hash` for the same user
    /// returns [`TransactionOutcome::Duplicate`] and changes nothing.
    #[tracing::instrument(skip(self), fields(currency = %currency, amount = %amount))]
    pub async fn deposit(
        &self,
        user_id: i64,
        amount: Decimal,
        currency: Currency,
        tx_hash: Option<String>
    ) -> Result<TransactionOutcome> {
        let mut request = CreateTransactionRequest::new(
            user_id,
            TransactionKind::Deposit,
            amount,
            currency
        );
        if let Some(hash) = tx_hash {
            let hash = hash.trim().to_string();
            if hash.is_empty() {
                return Err(AppError::InvalidInput("tx_hash cannot be empty".to_string()));
            }
            // External hashes get their own namespace next to the internal keys
            request = request.dedup_key(format!("deposit:{}", hash)).meta("tx_hash", hash);
        }

        self.transactions.create_transaction(request).await
    }

    /// Debit a withdrawal plus the flat TON fee, if one is configured. Both
    /// rows commit together or not at all.
    #[tracing::instrument(skip(self), fields(currency = %currency, amount = %amount))]
    pub async fn withdraw(
        &self,
        user_id: i64,
        amount: Decimal,
        currency: Currency,
        wallet_address: Option<String>
    ) -> Result<WithdrawalReceipt> {
        ensure_positive(amount)?;
        let fee = self.withdrawal_fee_ton;

        let txn = self.db.begin().await?;
        let user = self.users.lock(&txn, user_id).await?;

        // Check the total up front so a fee never overdraws after the withdrawal
        let ton_required = match currency {
            Currency::Ton => amount + fee,
            Currency::Uni => fee,
        };
        let available_ton = user.balance(Currency::Ton)?;
        if available_ton < ton_required {
            return Err(AppError::InsufficientBalance {
                currency: Currency::Ton,
                available: available_ton,
                required: ton_required,
            });
        }

        let mut request = CreateTransactionRequest::new(
            user_id,
            TransactionKind::Withdrawal,
            amount,
            currency
        );
        if let Some(address) = wallet_address {
            request = request.meta("wallet_address", address);
        }
        let withdrawal = Self::created(self.transactions.apply(&txn, request).await?)?;

        let fee_applied = if fee.is_zero() {
            None
        } else {
            let request = CreateTransactionRequest::new(
                user_id,
                TransactionKind::WithdrawalFee,
                fee,
                Currency::Ton
            ).meta("withdrawal_id", withdrawal.transaction.id);
            Some(Self::created(self.transactions.apply(&txn, request).await?)?)
        };

        txn.commit().await?;

        self.transactions.publish(&withdrawal).await;
        if let Some(applied) = &fee_applied {
            self.transactions.publish(applied).await;
        }

        let balances = fee_applied
            .as_ref()
            .map(|applied| applied.balances)
            .unwrap_or(withdrawal.balances);

        tracing::info!(user_id, transaction_id = withdrawal.transaction.id, "withdrawal recorded");

        Ok(WithdrawalReceipt {
            transaction_id: withdrawal.transaction.id,
            fee_transaction_id: fee_applied.as_ref().map(|applied| applied.transaction.id),
            amount,
            fee,
            currency,
            balances,
        })
    }

    /// Move UNI from the balance into the farming deposit and open the
    /// position if it was closed.
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    pub async fn deposit_uni_farming(
        &self,
        user_id: i64,
        amount: Decimal
    ) -> Result<FarmingDepositReceipt> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let request = CreateTransactionRequest::new(
            user_id,
            TransactionKind::FarmingDeposit,
            amount,
            Currency::Uni
        );
        let applied = Self::created(self.transactions.apply(&txn, request).await?)?;

        let user = self.users.get(&txn, user_id).await?;
        let deposit_total = user.uni_deposit()? + amount;
        let was_active = user.uni_farming_active;
        let has_rate = user.uni_farming_rate.is_some();

        let mut model: user::ActiveModel = user.into();
        model.uni_deposit_amount = Set(Some(to_stored(deposit_total)));
        if !was_active {
            model.uni_farming_active = Set(true);
            model.uni_farming_start = Set(Some(now));
            model.uni_farming_last_update = Set(Some(now));
        }
        if !has_rate {
            model.uni_farming_rate = Set(Some(to_stored(self.uni_daily_rate)));
        }
        self.users.save(&txn, model).await?;

        txn.commit().await?;
        self.transactions.publish(&applied).await;

        tracing::info!(user_id, deposit_total = %deposit_total, "UNI farming deposit recorded");

        Ok(FarmingDepositReceipt {
            transaction_id: applied.transaction.id,
            deposit_total,
            balances: applied.balances,
        })
    }

    /// Pay the package price in TON, activate the boost and credit the UNI
    /// bonus (if the package has one), all in one database transaction.
    #[tracing::instrument(skip(self))]
    pub async fn purchase_boost(&self, user_id: i64, package_id: i32) -> Result<BoostPurchaseReceipt> {
        let package = self.packages
            .iter()
            .find(|p| p.id == package_id)
            .cloned()
            .ok_or(AppError::UnknownBoostPackage(package_id))?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let request = CreateTransactionRequest::new(
            user_id,
            TransactionKind::BoostPurchase,
            package.price_ton,
            Currency::Ton
        )
            .description(format!("Purchase of {}", package.name))
            .meta("package_id", package.id)
            .meta("daily_rate", package.daily_rate.to_string());
        let purchase = Self::created(self.transactions.apply(&txn, request).await?)?;

        let user = self.users.get(&txn, user_id).await?;
        let boost_deposit = user.ton_deposit()? + package.price_ton;
        let was_active = user.ton_boost_active;

        let mut model: user::ActiveModel = user.into();
        model.ton_boost_package = Set(Some(package.id));
        model.ton_boost_rate = Set(Some(to_stored(package.daily_rate)));
        model.ton_boost_deposit = Set(Some(to_stored(boost_deposit)));
        if !was_active {
            model.ton_boost_active = Set(true);
            model.ton_boost_start = Set(Some(now));
            model.ton_boost_last_update = Set(Some(now));
        }
        self.users.save(&txn, model).await?;

        let bonus = if package.bonus_uni.is_zero() {
            None
        } else {
            let request = CreateTransactionRequest::new(
                user_id,
                TransactionKind::BoostBonus,
                package.bonus_uni,
                Currency::Uni
            )
                .description(format!("{} bonus", package.name))
                .meta("package_id", package.id)
                .dedup_key(format!("boost_bonus:{}", purchase.transaction.id));
            Some(Self::created(self.transactions.apply(&txn, request).await?)?)
        };

        txn.commit().await?;

        self.transactions.publish(&purchase).await;
        if let Some(applied) = &bonus {
            self.transactions.publish(applied).await;
        }

        tracing::info!(user_id, package_id, boost_deposit = %boost_deposit, "boost purchased");

        Ok(BoostPurchaseReceipt {
            transaction_id: purchase.transaction.id,
            bonus_transaction_id: bonus.as_ref().map(|applied| applied.transaction.id),
            boost_deposit,
            balances: bonus.as_ref().map(|applied| applied.balances).unwrap_or(purchase.balances),
            package,
        })
    }

    // Rows written here carry no caller-supplied key except fresh ones, so a
    // duplicate means the ledger is already inconsistent.
    fn created(outcome: TransactionOutcome) -> Result<AppliedTransaction> {
        match outcome {
            TransactionOutcome::Created(applied) => Ok(applied),
            TransactionOutcome::Duplicate { existing } =>
                Err(AppError::Internal(format!("Unexpected duplicate of transaction {}", existing.id))),
        }
    }
}
