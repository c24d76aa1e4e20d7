use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable settlement snapshot. Amounts are fixed at creation; only the
/// status fields and the stock bookkeeping flag change afterwards.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub business_id: Uuid,
    /// `None` for guest checkouts (cash orders without a Telegram identity).
    #[sea_orm(indexed)]
    pub user_telegram_id: Option<i64>,

    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: Option<String>,

    /// Pre-discount amount, delivery cost included.
    pub subtotal_amount: Decimal,
    /// Promocode and loyalty discounts combined.
    pub discount_amount: Decimal,
    /// `max(0, subtotal_amount - discount_amount)`.
    pub total_amount: Decimal,
    pub currency: String,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,

    #[sea_orm(indexed)]
    pub promocode_id: Option<Uuid>,
    pub loyalty_points_earned: Decimal,
    pub loyalty_points_spent: Option<Decimal>,

    /// Whether acceptance-time stock deduction has been applied. Keeps
    /// accept/cancel stock side effects from double-applying.
    pub stock_deducted: bool,

    /// Delivery method, computed delivery cost, and similar free-form data.
    #[sea_orm(column_type = "Json", nullable)]
    pub order_metadata: Option<Json>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Forward-moving order state machine:
/// new -> accepted -> preparing -> ready -> completed, with cancellation
/// permitted only from `new` or `accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Only adjacent forward steps are allowed; cancellation only while the
    /// order has not entered preparation.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, OrderStatus::Accepted)
                | (Self::Accepted, OrderStatus::Preparing)
                | (Self::Preparing, OrderStatus::Ready)
                | (Self::Ready, OrderStatus::Completed)
                | (Self::New, OrderStatus::Cancelled)
                | (Self::Accepted, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Pending resolves to paid or failed; either resolved state may be
    /// refunded. Refunded is terminal.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, PaymentStatus::Paid)
                | (Self::Pending, PaymentStatus::Failed)
                | (Self::Paid, PaymentStatus::Refunded)
                | (Self::Failed, PaymentStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "online")]
    Online,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::business::Entity",
        from = "Column::BusinessId",
        to = "super::business::Column::Id"
    )]
    Business,
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::business::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Business.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
