use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };

use crate::enums::{ Currency, StoredTxType, TransactionKind, TxStatus };
use crate::error;
use crate::money::parse_stored;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub tx_type: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub description: String,
    /// JSON object. Always carries `original_type`.
    pub metadata: String,
    pub dedup_key: Option<String>,
    pub source_user_id: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn metadata_map(&self) -> Map<String, JsonValue> {
        match serde_json::from_str::<JsonValue>(&self.metadata) {
            Ok(JsonValue::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// The domain kind of this row. `metadata.original_type` wins over the
    /// narrower stored `tx_type`.
    pub fn kind(&self) -> error::Result<TransactionKind> {
        if let Some(JsonValue::String(original)) = self.metadata_map().get("original_type") {
            if let Ok(kind) = original.parse::<TransactionKind>() {
                return Ok(kind);
            }
        }
        Ok(self.tx_type.parse::<StoredTxType>()?.default_kind())
    }

    pub fn amount(&self) -> error::Result<Decimal> {
        parse_stored(&self.amount)
    }

    pub fn currency(&self) -> error::Result<Currency> {
        self.currency.parse()
    }

    pub fn status(&self) -> error::Result<TxStatus> {
        self.status.parse()
    }
}
