use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a promocode application. One row per successful
/// application, created in the same transaction as the order it discounts.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promocode_usages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub promocode_id: Uuid,
    #[sea_orm(indexed)]
    pub order_id: Uuid,
    #[sea_orm(indexed)]
    pub user_telegram_id: Option<i64>,

    pub discount_amount: Decimal,
    pub order_amount_before: Decimal,
    pub order_amount_after: Decimal,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::promocode::Entity",
        from = "Column::PromocodeId",
        to = "super::promocode::Column::Id"
    )]
    Promocode,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::promocode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Promocode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
