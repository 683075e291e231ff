use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

use crate::enums::Currency;
use crate::error;
use crate::money::{ parse_stored, parse_stored_or_zero };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub telegram_id: i64,
    pub username: Option<String>,
    pub balance_uni: String,
    pub balance_ton: String,
    pub uni_deposit_amount: Option<String>,
    pub uni_farming_rate: Option<String>,
    pub uni_farming_active: bool,
    pub uni_farming_start: Option<DateTimeUtc>,
    pub uni_farming_last_update: Option<DateTimeUtc>,
    pub ton_boost_package: Option<i32>,
    pub ton_boost_rate: Option<String>,
    pub ton_boost_deposit: Option<String>,
    pub ton_boost_active: bool,
    pub ton_boost_start: Option<DateTimeUtc>,
    pub ton_boost_last_update: Option<DateTimeUtc>,
    pub referred_by: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transaction,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn balance(&self, currency: Currency) -> error::Result<Decimal> {
        match currency {
            Currency::Uni => parse_stored(&self.balance_uni),
            Currency::Ton => parse_stored(&self.balance_ton),
        }
    }

    pub fn uni_deposit(&self) -> error::Result<Decimal> {
        parse_stored_or_zero(self.uni_deposit_amount.as_deref())
    }

    pub fn ton_deposit(&self) -> error::Result<Decimal> {
        parse_stored_or_zero(self.ton_boost_deposit.as_deref())
    }
}
