use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. Pricing state (base price, discount window, variation
/// schema) lives here; the authoritative unit price for an order line is
/// always re-derived server-side from this row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub business_id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub sku: Option<String>,
    pub image_url: Option<String>,

    /// Named option groups mapping value -> price delta, e.g.
    /// `{"size": {"L": 100, "M": 0}}`. Deltas are applied per selected
    /// option at order time and never written back to `price`.
    #[sea_orm(column_type = "Json", nullable)]
    pub variations: Option<Json>,

    /// Percentage discount (0-100). Ignored while `discount_price` is set
    /// and the discount window is active.
    pub discount_percentage: Option<Decimal>,
    /// Fixed discounted price; wins over `discount_percentage`.
    pub discount_price: Option<Decimal>,
    pub discount_valid_from: Option<DateTime<Utc>>,
    pub discount_valid_until: Option<DateTime<Utc>>,

    /// `None` means stock is not tracked for this product.
    pub stock_quantity: Option<i32>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::business::Entity",
        from = "Column::BusinessId",
        to = "super::business::Column::Id"
    )]
    Business,
    #[sea_orm(has_many = "super::product_category::Entity")]
    ProductCategories,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::business::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Business.def()
    }
}

impl Related<super::product_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductCategories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
