use std::collections::{ BTreeMap, HashSet };
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::ReferralConfig;
use crate::db::{ TransactionRepository, UserRepository };
use crate::enums::{ Currency, TransactionKind };
use crate::error::{ AppError, Result };
use crate::money::round_amount;

use super::transaction_service::{
    CreateTransactionRequest,
    TransactionOutcome,
    TransactionService,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Commission {
    pub level: usize,
    pub user_id: i64,
    pub amount: Decimal,
    pub transaction_id: i64,
}

#[derive(Debug, Clone)]
pub struct CommissionFailure {
    pub level: usize,
    pub user_id: i64,
    pub error: String,
}

/// Why the walk up the chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStop {
    /// Reached a user without a referrer.
    EndOfChain,
    MaxLevels,
    /// A user was seen twice. Never valid data, logged as an error.
    Cycle {
        user_id: i64,
    },
    /// `referred_by` points at a row that does not exist.
    MissingReferrer {
        user_id: i64,
    },
    /// Reading the next ancestor failed, so the rest of the chain is unknown.
    LookupFailed {
        user_id: i64,
    },
}

#[derive(Debug, Clone)]
pub struct PropagationReport {
    pub paid: Vec<Commission>,
    /// Levels whose commission already existed for this source transaction.
    pub duplicates: usize,
    pub failures: Vec<CommissionFailure>,
    pub stop: ChainStop,
}

impl PropagationReport {
    pub fn total_paid(&self) -> Decimal {
        self.paid.iter().map(|c| c.amount).sum()
    }
}

/// Commission earned from one depth of a user's downline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelIncome {
    pub level: u64,
    pub commissions: usize,
    /// Distinct downline users that produced these commissions.
    pub source_users: usize,
    pub uni: Decimal,
    pub ton: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralIncome {
    pub user_id: i64,
    pub direct_referrals: u64,
    pub total_uni: Decimal,
    pub total_ton: Decimal,
    /// Only levels that paid something, shallowest first.
    pub levels: Vec<LevelIncome>,
}

/// Pays a share of a yield event to each ancestor in the referral chain.
pub struct ReferralService {
    users: Arc<UserRepository>,
    rows: Arc<TransactionRepository>,
    transactions: Arc<TransactionService>,
    config: ReferralConfig,
}

impl ReferralService {
    pub fn new(
        users: Arc<UserRepository>,
        rows: Arc<TransactionRepository>,
        transactions: Arc<TransactionService>,
        config: ReferralConfig
    ) -> Self {
        Self {
            users,
            rows,
            transactions,
            config,
        }
    }

    pub fn max_levels(&self) -> usize {
        self.config.max_levels
    }

    /// Walk `referred_by` upward from `origin_user_id`, crediting
    /// `base_amount * rate[level]` at each level.
    ///
    /// The walk is bounded by `max_levels` and by a visited set, so it ends
    /// even on corrupt (cyclic) data. A failed credit is recorded and the walk
    /// continues. With a `source_transaction_id` every level carries the dedup
    /// key `referral:<source>:<level>`, which makes a retry safe.
    #[tracing::instrument(skip(self), fields(currency = %currency, base_amount = %base_amount))]
    pub async fn propagate(
        &self,
        origin_user_id: i64,
        base_amount: Decimal,
        currency: Currency,
        source_transaction_id: Option<i64>
    ) -> Result<PropagationReport> {
        if base_amount.is_sign_negative() {
            return Err(AppError::InvalidInput(format!("Commission base must not be negative: {}", base_amount)));
        }

        let origin = self.users
            .find_by_id(origin_user_id).await?
            .ok_or(AppError::UserNotFound(origin_user_id))?;

        let mut paid = Vec::new();
        let mut failures = Vec::new();
        let mut duplicates = 0;

        let mut visited = HashSet::from([origin.id]);
        let mut next = origin.referred_by;
        let mut level = 1;

        let stop = loop {
            let Some(ancestor_id) = next else {
                break ChainStop::EndOfChain;
            };
            if level > self.config.max_levels {
                break ChainStop::MaxLevels;
            }
            if !visited.insert(ancestor_id) {
                tracing::error!(
                    origin_user_id,
                    user_id = ancestor_id,
                    depth = level,
                    "referral cycle detected, chain stopped"
                );
                break ChainStop::Cycle { user_id: ancestor_id };
            }

            let ancestor = match self.users.find_by_id(ancestor_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::warn!(origin_user_id, user_id = ancestor_id, depth = level, "referrer does not exist");
                    break ChainStop::MissingReferrer { user_id: ancestor_id };
                }
                Err(e) => {
                    tracing::error!(origin_user_id, user_id = ancestor_id, depth = level, error = %e, "referrer lookup failed");
                    failures.push(CommissionFailure {
                        level,
                        user_id: ancestor_id,
                        error: e.to_string(),
                    });
                    break ChainStop::LookupFailed { user_id: ancestor_id };
                }
            };
            next = ancestor.referred_by;

            let Some(rate) = self.config.rate_for_level(level) else {
                break ChainStop::MaxLevels;
            };
            let amount = round_amount(base_amount * rate);
            if amount.is_zero() {
                tracing::debug!(user_id = ancestor.id, depth = level, "commission rounds to zero, skipped");
                level += 1;
                continue;
            }

            let mut request = CreateTransactionRequest::new(
                ancestor.id,
                TransactionKind::ReferralReward,
                amount,
                currency
            )
                .description(format!("Referral reward level {} from user {}", level, origin.id))
                .meta("source_user_id", origin.id)
                .meta("level", level as u64)
                .meta("rate", rate.to_string())
                .source_user(origin.id);
            if let Some(source_id) = source_transaction_id {
                request = request
                    .meta("source_transaction_id", source_id)
                    .dedup_key(format!("referral:{}:{}", source_id, level));
            }

            match self.transactions.create_transaction(request).await {
                Ok(TransactionOutcome::Created(applied)) => {
                    paid.push(Commission {
                        level,
                        user_id: ancestor.id,
                        amount,
                        transaction_id: applied.transaction.id,
                    });
                }
                Ok(TransactionOutcome::Duplicate { .. }) => {
                    duplicates += 1;
                }
                Err(e) => {
                    tracing::error!(
                        origin_user_id,
                        user_id = ancestor.id,
                        depth = level,
                        amount = %amount,
                        error = %e,
                        "commission failed"
                    );
                    failures.push(CommissionFailure {
                        level,
                        user_id: ancestor.id,
                        error: e.to_string(),
                    });
                }
            }

            level += 1;
        };

        if !paid.is_empty() || !failures.is_empty() {
            tracing::info!(
                origin_user_id,
                levels_paid = paid.len(),
                failures = failures.len(),
                "referral commissions propagated"
            );
        }

        Ok(PropagationReport {
            paid,
            duplicates,
            failures,
            stop,
        })
    }
}

impl ReferralService {
    /// Commission income of `user_id` grouped by level, read back from the
    /// ledger. Rows without a `level` tag count towards the totals only.
    pub async fn level_income(&self, user_id: i64) -> Result<ReferralIncome> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(AppError::UserNotFound(user_id));
        }

        let rows = self.rows.referral_rewards_for_user(user_id).await?;
        let direct_referrals = self.users.count_referrals(user_id).await?;

        let mut total_uni = Decimal::ZERO;
        let mut total_ton = Decimal::ZERO;
        let mut by_level: BTreeMap<u64, (LevelIncome, HashSet<i64>)> = BTreeMap::new();

        for row in &rows {
            let amount = row.amount()?;
            let currency = row.currency()?;
            match currency {
                Currency::Uni => {
                    total_uni += amount;
                }
                Currency::Ton => {
                    total_ton += amount;
                }
            }

            let metadata = row.metadata_map();
            let Some(level) = metadata.get("level").and_then(|v| v.as_u64()) else {
                tracing::debug!(user_id, transaction_id = row.id, "commission row without level");
                continue;
            };
            let source = row.source_user_id.or_else(||
                metadata.get("source_user_id").and_then(|v| v.as_i64())
            );

            let (income, sources) = by_level.entry(level).or_insert_with(|| {
                let income = LevelIncome {
                    level,
                    commissions: 0,
                    source_users: 0,
                    uni: Decimal::ZERO,
                    ton: Decimal::ZERO,
                };
                (income, HashSet::new())
            });
            income.commissions += 1;
            match currency {
                Currency::Uni => {
                    income.uni += amount;
                }
                Currency::Ton => {
                    income.ton += amount;
                }
            }
            if let Some(source) = source {
                sources.insert(source);
            }
        }

        let levels = by_level
            .into_values()
            .map(|(mut income, sources)| {
                income.source_users = sources.len();
                income
            })
            .collect();

        Ok(ReferralIncome {
            user_id,
            direct_referrals,
            total_uni,
            total_ton,
            levels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        create_referral_chain,
        create_referred_user,
        create_test_user,
        setup_test_ledger,
    };

    #[tokio::test]
    async fn user_without_referrer_pays_nothing() {
        let ledger = setup_test_ledger().await.unwrap();
        let user = create_test_user(&ledger.db, 1).await.unwrap();

        let report = ledger.referrals
            .propagate(user.id, Decimal::from(10), Currency::Uni, None).await
            .unwrap();

        assert!(report.paid.is_empty());
        assert_eq!(report.stop, ChainStop::EndOfChain);
    }

    #[tokio::test]
    async fn dust_commissions_are_skipped() {
        let ledger = setup_test_ledger().await.unwrap();
        let parent = create_test_user(&ledger.db, 1).await.unwrap();
        let child = create_referred_user(&ledger.db, 2, parent.id).await.unwrap();

        // 5% of 1e-8 truncates to zero
        let report = ledger.referrals
            .propagate(child.id, Decimal::new(1, 8), Currency::Uni, Some(1)).await
            .unwrap();

        assert!(report.paid.is_empty());
        assert!(report.failures.is_empty());
        assert!(ledger.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn income_is_grouped_by_level_and_currency() {
        let ledger = setup_test_ledger().await.unwrap();
        let chain = create_referral_chain(&ledger.db, 3).await.unwrap();
        let (root, middle, leaf) = (&chain[0], &chain[1], &chain[2]);

        ledger.referrals.propagate(leaf.id, Decimal::from(10), Currency::Uni, Some(1)).await.unwrap();
        ledger.referrals.propagate(leaf.id, Decimal::from(100), Currency::Ton, Some(2)).await.unwrap();
        ledger.referrals.propagate(middle.id, Decimal::from(20), Currency::Uni, Some(3)).await.unwrap();

        let income = ledger.referrals.level_income(root.id).await.unwrap();

        assert_eq!(income.direct_referrals, 1);
        assert_eq!(income.total_uni, Decimal::new(13, 1));
        assert_eq!(income.total_ton, Decimal::from(3));
        assert_eq!(income.levels.len(), 2);

        let first = &income.levels[0];
        assert_eq!((first.level, first.commissions, first.source_users), (1, 1, 1));
        assert_eq!(first.uni, Decimal::from(1));
        assert_eq!(first.ton, Decimal::ZERO);

        let second = &income.levels[1];
        assert_eq!((second.level, second.commissions, second.source_users), (2, 2, 1));
        assert_eq!(second.uni, Decimal::new(3, 1));
        assert_eq!(second.ton, Decimal::from(3));
    }

    #[tokio::test]
    async fn income_of_unknown_user_is_not_found() {
        let ledger = setup_test_ledger().await.unwrap();

        let err = ledger.referrals.level_income(404).await.unwrap_err();

        assert!(matches!(err, AppError::UserNotFound(404)));
    }

    #[tokio::test]
    async fn replaying_a_source_transaction_pays_once() {
        let ledger = setup_test_ledger().await.unwrap();
        let parent = create_test_user(&ledger.db, 1).await.unwrap();
        let child = create_referred_user(&ledger.db, 2, parent.id).await.unwrap();

        let first = ledger.referrals
            .propagate(child.id, Decimal::from(10), Currency::Uni, Some(42)).await
            .unwrap();
        let second = ledger.referrals
            .propagate(child.id, Decimal::from(10), Currency::Uni, Some(42)).await
            .unwrap();

        assert_eq!(first.paid.len(), 1);
        assert_eq!(second.paid.len(), 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(
            ledger.balances.get_balance(parent.id).await.unwrap().uni,
            Decimal::new(5, 1)
        );
    }
}
