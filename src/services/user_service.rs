use std::sync::Arc;

use sea_orm::{ DatabaseConnection, TransactionTrait };
use serde::Serialize;

use crate::db::{ user, UserRepository };
use crate::error::{ AppError, Result };

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: user::Model,
    /// False when the telegram id was already registered.
    pub created: bool,
}

pub struct UserService {
    db: DatabaseConnection,
    users: Arc<UserRepository>,
}

impl UserService {
    pub fn new(db: DatabaseConnection, users: Arc<UserRepository>) -> Self {
        Self { db, users }
    }

    /// Create the user on first contact. Idempotent on `telegram_id`; the
    /// referrer is only ever set here and an existing user keeps theirs.
    #[tracing::instrument(skip(self, username))]
    pub async fn register(
        &self,
        telegram_id: i64,
        username: Option<String>,
        referred_by: Option<i64>
    ) -> Result<Registration> {
        if let Some(existing) = self.users.find_by_telegram_id(telegram_id).await? {
            if referred_by.is_some() && existing.referred_by != referred_by {
                tracing::debug!(user_id = existing.id, "referrer ignored for existing user");
            }
            return Ok(Registration { user: existing, created: false });
        }

        if let Some(referrer_id) = referred_by {
            let referrer = self.users
                .find_by_id(referrer_id).await?
                .ok_or_else(||
                    AppError::ReferralRejected(format!("Referrer {} does not exist", referrer_id))
                )?;
            if referrer.telegram_id == telegram_id {
                return Err(AppError::ReferralRejected("Users cannot refer themselves".to_string()));
            }
        }

        let txn = self.db.begin().await?;
        let created = self.users.create(&txn, telegram_id, username, referred_by).await;
        let user = match created {
            Ok(user) => {
                txn.commit().await?;
                user
            }
            Err(e) => {
                txn.rollback().await?;
                // Lost a race with a concurrent registration of the same id
                return match self.users.find_by_telegram_id(telegram_id).await? {
                    Some(existing) => Ok(Registration { user: existing, created: false }),
                    None => Err(e),
                };
            }
        };

        tracing::info!(user_id = user.id, telegram_id, referred_by = ?referred_by, "user registered");

        Ok(Registration { user, created: true })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<user::Model> {
        self.users.find_by_id(user_id).await?.ok_or(AppError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_ledger;

    #[tokio::test]
    async fn registration_is_idempotent_and_keeps_referrer() {
        let ledger = setup_test_ledger().await.unwrap();
        let parent = ledger.accounts.register(100, None, None).await.unwrap();
        let other = ledger.accounts.register(101, None, None).await.unwrap();

        let first = ledger.accounts.register(200, Some("alice".into()), Some(parent.user.id)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.user.referred_by, Some(parent.user.id));

        let again = ledger.accounts.register(200, None, Some(other.user.id)).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.user.id, first.user.id);
        assert_eq!(again.user.referred_by, Some(parent.user.id));
    }

    #[tokio::test]
    async fn unknown_referrer_is_rejected() {
        let ledger = setup_test_ledger().await.unwrap();

        let err = ledger.accounts.register(300, None, Some(12345)).await.unwrap_err();

        assert!(matches!(err, AppError::ReferralRejected(_)));
        assert!(ledger.users.find_by_telegram_id(300).await.unwrap().is_none());
    }
}
