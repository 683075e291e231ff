use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Serialize };

use crate::error::AppError;

// ─── Currency ────────────────────────────────────────────────────────

/// Balance currencies held on a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Uni,
    Ton,
}

impl Currency {
    /// Canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Uni => "UNI",
            Currency::Ton => "TON",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNI" => Ok(Currency::Uni),
            "TON" => Ok(Currency::Ton),
            _ => Err(AppError::InvalidInput(format!("Unknown currency: {}. Supported: UNI, TON", s))),
        }
    }
}

// ─── Direction ───────────────────────────────────────────────────────

/// Which way a transaction kind moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

// ─── TransactionKind ─────────────────────────────────────────────────

/// Every balance-affecting event the ledger knows about.
///
/// This is the domain view. The `transactions.tx_type` column only accepts
/// the narrower [`StoredTxType`] set, see [`TransactionKind::storage_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    FarmingReward,
    #[serde(rename = "TON_BOOST_INCOME")]
    BoostIncome,
    ReferralReward,
    Deposit,
    Withdrawal,
    WithdrawalFee,
    BoostPurchase,
    FarmingDeposit,
    DailyBonus,
    MissionReward,
    AirdropReward,
    BoostBonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::FarmingReward => "FARMING_REWARD",
            TransactionKind::BoostIncome => "TON_BOOST_INCOME",
            TransactionKind::ReferralReward => "REFERRAL_REWARD",
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::WithdrawalFee => "WITHDRAWAL_FEE",
            TransactionKind::BoostPurchase => "BOOST_PURCHASE",
            TransactionKind::FarmingDeposit => "FARMING_DEPOSIT",
            TransactionKind::DailyBonus => "DAILY_BONUS",
            TransactionKind::MissionReward => "MISSION_REWARD",
            TransactionKind::AirdropReward => "AIRDROP_REWARD",
            TransactionKind::BoostBonus => "BOOST_BONUS",
        }
    }

    /// Sign convention. Callers never negate amounts themselves.
    pub fn direction(&self) -> Direction {
        match self {
            | TransactionKind::Withdrawal
            | TransactionKind::WithdrawalFee
            | TransactionKind::BoostPurchase
            | TransactionKind::FarmingDeposit => Direction::Debit,
            _ => Direction::Credit,
        }
    }

    /// The single place where the domain kind is narrowed to what the storage
    /// enum accepts. Lossy mappings are recovered from `metadata.original_type`.
    pub fn storage_type(&self) -> StoredTxType {
        match self {
            TransactionKind::FarmingReward => StoredTxType::FarmingReward,
            TransactionKind::BoostIncome => StoredTxType::FarmingReward,
            TransactionKind::ReferralReward => StoredTxType::ReferralReward,
            TransactionKind::Deposit => StoredTxType::Deposit,
            TransactionKind::Withdrawal => StoredTxType::Withdrawal,
            TransactionKind::WithdrawalFee => StoredTxType::Withdrawal,
            TransactionKind::BoostPurchase => StoredTxType::BoostPayment,
            TransactionKind::FarmingDeposit => StoredTxType::FarmingDeposit,
            TransactionKind::DailyBonus => StoredTxType::DailyBonus,
            TransactionKind::MissionReward => StoredTxType::MissionReward,
            TransactionKind::AirdropReward => StoredTxType::DailyBonus,
            TransactionKind::BoostBonus => StoredTxType::DailyBonus,
        }
    }

    pub fn all() -> &'static [TransactionKind] {
        &[
            TransactionKind::FarmingReward,
            TransactionKind::BoostIncome,
            TransactionKind::ReferralReward,
            TransactionKind::Deposit,
            TransactionKind::Withdrawal,
            TransactionKind::WithdrawalFee,
            TransactionKind::BoostPurchase,
            TransactionKind::FarmingDeposit,
            TransactionKind::DailyBonus,
            TransactionKind::MissionReward,
            TransactionKind::AirdropReward,
            TransactionKind::BoostBonus,
        ]
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        TransactionKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown transaction type: {}", s)))
    }
}

// ─── StoredTxType ────────────────────────────────────────────────────

/// Values accepted by the `transactions.tx_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoredTxType {
    FarmingReward,
    FarmingDeposit,
    ReferralReward,
    MissionReward,
    DailyBonus,
    Withdrawal,
    Deposit,
    BoostPayment,
}

impl StoredTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredTxType::FarmingReward => "FARMING_REWARD",
            StoredTxType::FarmingDeposit => "FARMING_DEPOSIT",
            StoredTxType::ReferralReward => "REFERRAL_REWARD",
            StoredTxType::MissionReward => "MISSION_REWARD",
            StoredTxType::DailyBonus => "DAILY_BONUS",
            StoredTxType::Withdrawal => "WITHDRAWAL",
            StoredTxType::Deposit => "DEPOSIT",
            StoredTxType::BoostPayment => "BOOST_PAYMENT",
        }
    }

    /// Best-effort domain kind for rows written without `original_type`.
    pub fn default_kind(&self) -> TransactionKind {
        match self {
            StoredTxType::FarmingReward => TransactionKind::FarmingReward,
            StoredTxType::FarmingDeposit => TransactionKind::FarmingDeposit,
            StoredTxType::ReferralReward => TransactionKind::ReferralReward,
            StoredTxType::MissionReward => TransactionKind::MissionReward,
            StoredTxType::DailyBonus => TransactionKind::DailyBonus,
            StoredTxType::Withdrawal => TransactionKind::Withdrawal,
            StoredTxType::Deposit => TransactionKind::Deposit,
            StoredTxType::BoostPayment => TransactionKind::BoostPurchase,
        }
    }
}

impl fmt::Display for StoredTxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoredTxType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FARMING_REWARD" => Ok(StoredTxType::FarmingReward),
            "FARMING_DEPOSIT" => Ok(StoredTxType::FarmingDeposit),
            "REFERRAL_REWARD" => Ok(StoredTxType::ReferralReward),
            "MISSION_REWARD" => Ok(StoredTxType::MissionReward),
            "DAILY_BONUS" => Ok(StoredTxType::DailyBonus),
            "WITHDRAWAL" => Ok(StoredTxType::Withdrawal),
            "DEPOSIT" => Ok(StoredTxType::Deposit),
            "BOOST_PAYMENT" => Ok(StoredTxType::BoostPayment),
            _ => Err(AppError::InvalidInput(format!("Unknown stored transaction type: {}", s))),
        }
    }
}

// ─── TxStatus ────────────────────────────────────────────────────────

/// Status of a ledger row. Completed rows are never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TxStatus::Pending),
            "completed" | "confirmed" => Ok(TxStatus::Completed),
            "failed" => Ok(TxStatus::Failed),
            _ => Err(AppError::InvalidInput(format!("Invalid transaction status: {}", s))),
        }
    }
}

// ─── DebitPolicy ─────────────────────────────────────────────────────

/// How the balance manager treats a debit larger than the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitPolicy {
    /// Refuse with `InsufficientBalance`. Used by every user-initiated debit.
    Strict,
    /// Floor the balance at zero and log the overdraw attempt.
    Clamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_income_is_stored_as_farming_reward() {
        assert_eq!(TransactionKind::BoostIncome.storage_type(), StoredTxType::FarmingReward);
        assert_eq!(TransactionKind::BoostPurchase.storage_type(), StoredTxType::BoostPayment);
        assert_eq!(TransactionKind::AirdropReward.storage_type(), StoredTxType::DailyBonus);
    }

    #[test]
    fn debit_kinds_are_fixed() {
        let debits: Vec<_> = TransactionKind::all()
            .iter()
            .filter(|k| k.direction() == Direction::Debit)
            .copied()
            .collect();
        assert_eq!(debits, vec![
            TransactionKind::Withdrawal,
            TransactionKind::WithdrawalFee,
            TransactionKind::BoostPurchase,
            TransactionKind::FarmingDeposit
        ]);
    }

    #[test]
    fn legacy_confirmed_status_reads_as_completed() {
        assert_eq!("confirmed".parse::<TxStatus>().unwrap(), TxStatus::Completed);
    }

    #[test]
    fn unknown_currency_is_rejected() {
        assert!("BTC".parse::<Currency>().is_err());
        assert_eq!("ton".parse::<Currency>().unwrap(), Currency::Ton);
    }
}
