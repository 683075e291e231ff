use chrono::{ DateTime, Utc };
use sea_orm::{
    entity::prelude::*,
    ActiveValue::NotSet,
    ConnectionTrait,
    DatabaseConnection,
    PaginatorTrait,
    QueryOrder,
    QuerySelect,
    Set,
};

use crate::error::{ AppError, Result };

pub mod entity;
pub use entity::*;

mod transaction_repository;
pub use transaction_repository::{ NewTransaction, TransactionFilter, TransactionRepository };

/// Reads and writes of the `users` table.
///
/// Methods that take a `conn` are meant to run inside the caller's database
/// transaction; the rest read through the pool.
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<user::Model>> {
        let user = User::find_by_id(id).one(&self.db).await?;
        Ok(user)
    }

    pub async fn get<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<user::Model> {
        User::find_by_id(id).one(conn).await?.ok_or(AppError::UserNotFound(id))
    }

    /// `SELECT ... FOR UPDATE` on the user row. Every balance mutation goes
    /// through here first so writers for one user are serialized.
    pub async fn lock<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<user::Model> {
        User::find_by_id(id)
            .lock_exclusive()
            .one(conn).await?
            .ok_or(AppError::UserNotFound(id))
    }

    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<user::Model>> {
        let user = User::find()
            .filter(user::Column::TelegramId.eq(telegram_id))
            .one(&self.db).await?;
        Ok(user)
    }

    pub async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        telegram_id: i64,
        username: Option<String>,
        referred_by: Option<i64>
    ) -> Result<user::Model> {
        let now = Utc::now();
        let user = user::ActiveModel {
            id: NotSet,
            telegram_id: Set(telegram_id),
            username: Set(username),
            balance_uni: Set("0".to_string()),
            balance_ton: Set("0".to_string()),
            uni_deposit_amount: Set(None),
            uni_farming_rate: Set(None),
            uni_farming_active: Set(false),
            uni_farming_start: Set(None),
            uni_farming_last_update: Set(None),
            ton_boost_package: Set(None),
            ton_boost_rate: Set(None),
            ton_boost_deposit: Set(None),
            ton_boost_active: Set(false),
            ton_boost_start: Set(None),
            ton_boost_last_update: Set(None),
            referred_by: Set(referred_by),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let user = user.insert(conn).await?;
        Ok(user)
    }

    /// Persist the changed columns of `model` and stamp `updated_at`.
    pub async fn save<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut model: user::ActiveModel
    ) -> Result<user::Model> {
        model.updated_at = Set(Utc::now());
        let user = model.update(conn).await?;
        Ok(user)
    }

    /// Users who registered with `user_id` as their referrer.
    pub async fn count_referrals(&self, user_id: i64) -> Result<u64> {
        let total = User::find()
            .filter(user::Column::ReferredBy.eq(user_id))
            .count(&self.db).await?;
        Ok(total)
    }

    pub async fn active_farming_ids(&self) -> Result<Vec<i64>> {
        self.ids_where(user::Column::UniFarmingActive).await
    }

    pub async fn active_boost_ids(&self) -> Result<Vec<i64>> {
        self.ids_where(user::Column::TonBoostActive).await
    }

    async fn ids_where(&self, flag: user::Column) -> Result<Vec<i64>> {
        let ids = User::find()
            .select_only()
            .column(user::Column::Id)
            .filter(flag.eq(true))
            .filter(user::Column::IsActive.eq(true))
            .order_by_asc(user::Column::Id)
            .into_tuple::<i64>()
            .all(&self.db).await?;
        Ok(ids)
    }

    /// Move the UNI farming accrual cursor.
    pub async fn set_farming_cursor<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: user::Model,
        at: DateTime<Utc>
    ) -> Result<user::Model> {
        let mut model: user::ActiveModel = user.into();
        model.uni_farming_last_update = Set(Some(at));
        self.save(conn, model).await
    }

    /// Move the TON boost accrual cursor.
    pub async fn set_boost_cursor<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: user::Model,
        at: DateTime<Utc>
    ) -> Result<user::Model> {
        let mut model: user::ActiveModel = user.into();
        model.ton_boost_last_update = Set(Some(at));
        self.save(conn, model).await
    }
}
