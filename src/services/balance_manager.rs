use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ ConnectionTrait, Set };
use serde::{ Deserialize, Serialize };

use crate::db::{ user, UserRepository };
use crate::enums::{ Currency, DebitPolicy };
use crate::error::{ AppError, Result };
use crate::money::to_stored;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub uni: Decimal,
    pub ton: Decimal,
}

impl Balances {
    pub fn of(user: &user::Model) -> Result<Self> {
        Ok(Self {
            uni: user.balance(Currency::Uni)?,
            ton: user.balance(Currency::Ton)?,
        })
    }
}

/// The only writer of `users.balance_uni` / `users.balance_ton`.
///
/// Mutations take a connection so they join the caller's database
/// transaction; the user row is locked before it is read.
pub struct BalanceManager {
    users: Arc<UserRepository>,
}

impl BalanceManager {
    pub fn new(users: Arc<UserRepository>) -> Self {
        Self { users }
    }

    pub async fn get_balance(&self, user_id: i64) -> Result<Balances> {
        let user = self.users.find_by_id(user_id).await?.ok_or(AppError::UserNotFound(user_id))?;
        Balances::of(&user)
    }

    pub async fn add_balance<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        uni: Decimal,
        ton: Decimal
    ) -> Result<Balances> {
        Self::check_delta(uni)?;
        Self::check_delta(ton)?;

        let user = self.users.lock(conn, user_id).await?;
        let current = Balances::of(&user)?;
        let next = Balances {
            uni: current.uni + uni,
            ton: current.ton + ton,
        };

        self.write(conn, user, next).await?;

        tracing::debug!(user_id, uni = %uni, ton = %ton, "balance credited");
        Ok(next)
    }

    /// Debit both currencies. Under [`DebitPolicy::Strict`] an overdraw fails
    /// with `InsufficientBalance` and nothing is written. Under
    /// [`DebitPolicy::Clamp`] the balance floors at zero.
    pub async fn subtract_balance<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        uni: Decimal,
        ton: Decimal,
        policy: DebitPolicy
    ) -> Result<Balances> {
        Self::check_delta(uni)?;
        Self::check_delta(ton)?;

        let user = self.users.lock(conn, user_id).await?;
        let current = Balances::of(&user)?;

        let next = Balances {
            uni: Self::debit(user_id, Currency::Uni, current.uni, uni, policy)?,
            ton: Self::debit(user_id, Currency::Ton, current.ton, ton, policy)?,
        };

        self.write(conn, user, next).await?;

        tracing::debug!(user_id, uni = %uni, ton = %ton, "balance debited");
        Ok(next)
    }

    fn debit(
        user_id: i64,
        currency: Currency,
        available: Decimal,
        required: Decimal,
        policy: DebitPolicy
    ) -> Result<Decimal> {
        if available >= required {
            return Ok(available - required);
        }

        match policy {
            DebitPolicy::Strict =>
                Err(AppError::InsufficientBalance {
                    currency,
                    available,
                    required,
                }),
            DebitPolicy::Clamp => {
                tracing::warn!(
                    user_id,
                    currency = %currency,
                    available = %available,
                    required = %required,
                    "debit exceeds balance, clamping at zero"
                );
                Ok(Decimal::ZERO)
            }
        }
    }

    fn check_delta(delta: Decimal) -> Result<()> {
        if delta.is_sign_negative() && !delta.is_zero() {
            return Err(AppError::InvalidInput(format!("Balance delta must not be negative: {}", delta)));
        }
        Ok(())
    }

    async fn write<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: user::Model,
        next: Balances
    ) -> Result<()> {
        let mut model: user::ActiveModel = user.into();
        model.balance_uni = Set(to_stored(next.uni));
        model.balance_ton = Set(to_stored(next.ton));
        self.users.save(conn, model).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ create_test_user, set_balances, setup_test_db };

    #[tokio::test]
    async fn add_then_strict_subtract() {
        let db = setup_test_db().await.unwrap();
        let users = Arc::new(UserRepository::new(db.clone()));
        let manager = BalanceManager::new(users);
        let user = create_test_user(&db, 1).await.unwrap();

        let after_add = manager
            .add_balance(&db, user.id, Decimal::from(100), Decimal::new(25, 1)).await
            .unwrap();
        assert_eq!(after_add, Balances { uni: Decimal::from(100), ton: Decimal::new(25, 1) });

        let after_sub = manager
            .subtract_balance(&db, user.id, Decimal::from(40), Decimal::ZERO, DebitPolicy::Strict).await
            .unwrap();
        assert_eq!(after_sub.uni, Decimal::from(60));
        assert_eq!(manager.get_balance(user.id).await.unwrap().uni, Decimal::from(60));
    }

    #[tokio::test]
    async fn strict_overdraw_leaves_balance_untouched() {
        let db = setup_test_db().await.unwrap();
        let manager = BalanceManager::new(Arc::new(UserRepository::new(db.clone())));
        let user = create_test_user(&db, 1).await.unwrap();
        set_balances(&db, user.id, "0", "30").await.unwrap();

        let err = manager
            .subtract_balance(&db, user.id, Decimal::ZERO, Decimal::from(50), DebitPolicy::Strict).await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientBalance { currency: Currency::Ton, .. }));
        assert_eq!(manager.get_balance(user.id).await.unwrap().ton, Decimal::from(30));
    }

    #[tokio::test]
    async fn clamp_floors_at_zero() {
        let db = setup_test_db().await.unwrap();
        let manager = BalanceManager::new(Arc::new(UserRepository::new(db.clone())));
        let user = create_test_user(&db, 1).await.unwrap();
        set_balances(&db, user.id, "5", "0").await.unwrap();

        let balances = manager
            .subtract_balance(&db, user.id, Decimal::from(8), Decimal::ZERO, DebitPolicy::Clamp).await
            .unwrap();

        assert_eq!(balances.uni, Decimal::ZERO);
    }

    #[tokio::test]
    async fn negative_delta_is_rejected() {
        let db = setup_test_db().await.unwrap();
        let manager = BalanceManager::new(Arc::new(UserRepository::new(db.clone())));
        let user = create_test_user(&db, 1).await.unwrap();

        let err = manager.add_balance(&db, user.id, Decimal::from(-1), Decimal::ZERO).await;
        assert!(matches!(err, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let db = setup_test_db().await.unwrap();
        let manager = BalanceManager::new(Arc::new(UserRepository::new(db.clone())));

        let err = manager.add_balance(&db, 999, Decimal::ONE, Decimal::ZERO).await;
        assert!(matches!(err, Err(AppError::UserNotFound(999))));
    }
}
