use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only loyalty ledger row. The ledger, not the account row, is the
/// source of truth for double-credit prevention: accrual for an order is a
/// no-op when an `earned` row for that order already exists.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loyalty_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub account_id: Uuid,
    #[sea_orm(indexed)]
    pub order_id: Option<Uuid>,

    pub transaction_type: LoyaltyTransactionType,
    /// Positive for earned, negative for spent.
    pub points: Decimal,
    /// Account balance right after this transaction.
    pub balance_after: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum LoyaltyTransactionType {
    #[sea_orm(string_value = "earned")]
    Earned,
    #[sea_orm(string_value = "spent")]
    Spent,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::loyalty_account::Entity",
        from = "Column::AccountId",
        to = "super::loyalty_account::Column::Id"
    )]
    Account,
}

impl Related<super::loyalty_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
