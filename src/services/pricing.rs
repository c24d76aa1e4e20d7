use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    category::{self, Entity as CategoryEntity},
    product::{self, Entity as ProductEntity},
    product_category::{self, Entity as ProductCategoryEntity},
};
use crate::errors::ServiceError;
use crate::services::round2;

/// A fully-materialized, server-side-priced order line.
///
/// Category surcharges are returned alongside the unit price: they are an
/// order-level addition applied once per unit by the settlement flow, not
/// part of the unit price itself.
#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub product: product::Model,
    pub categories: Vec<category::Model>,
    pub quantity: i32,
    /// Discounted base price plus selected variation deltas.
    pub unit_price: Decimal,
    /// `unit_price * quantity`.
    pub line_total: Decimal,
    /// Sum of category surcharges for one unit of this product.
    pub surcharge_per_unit: Decimal,
    /// `surcharge_per_unit * quantity`.
    pub surcharge_total: Decimal,
}

/// Resolves authoritative prices from live catalog state.
/// Pure read path; client-submitted prices are never trusted.
#[derive(Clone)]
pub struct PricingService {
    #[allow(dead_code)] // Connection kept for standalone (non-orchestrated) callers
    db: Arc<DbPool>,
}

impl PricingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Prices one cart line against the catalog.
    ///
    /// Fails with `NotFound` for missing, inactive, or cross-tenant products
    /// and with `InsufficientStock` when the product tracks stock and the
    /// requested quantity exceeds it.
    #[instrument(skip(self, conn, selected_variations), fields(product_id = %product_id))]
    pub async fn resolve_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        selected_variations: Option<&HashMap<String, String>>,
    ) -> Result<ResolvedLine, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = ProductEntity::find_by_id(product_id)
            .filter(product::Column::BusinessId.eq(business_id))
            .filter(product::Column::IsActive.eq(true))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found or inactive", product_id))
            })?;

        if let Some(stock) = product.stock_quantity {
            if stock < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}': available {}, requested {}",
                    product.title, stock, quantity
                )));
            }
        }

        let categories = Self::categories_for(conn, product_id).await?;

        let mut unit_price = Self::discounted_price(&product, Utc::now());
        if let Some(selections) = selected_variations {
            unit_price += Self::variation_delta(&product, selections);
        }

        let line_total = unit_price * Decimal::from(quantity);
        let surcharge_per_unit: Decimal = categories.iter().map(|c| c.surcharge).sum();
        let surcharge_total = surcharge_per_unit * Decimal::from(quantity);

        Ok(ResolvedLine {
            product,
            categories,
            quantity,
            unit_price,
            line_total,
            surcharge_per_unit,
            surcharge_total,
        })
    }

    /// Effective base price with any active discount applied.
    ///
    /// A discount is active only while `now` falls inside its validity
    /// window (missing bounds are unbounded). A fixed discount price wins
    /// over a percentage. The result never exceeds the base price.
    pub fn discounted_price(product: &product::Model, now: DateTime<Utc>) -> Decimal {
        let has_discount =
            product.discount_percentage.is_some() || product.discount_price.is_some();
        if !has_discount {
            return product.price;
        }

        let window_open = match product.discount_valid_from {
            Some(from) => now >= from,
            None => true,
        };
        let window_not_closed = match product.discount_valid_until {
            Some(until) => now <= until,
            None => true,
        };
        if !window_open || !window_not_closed {
            return product.price;
        }

        if let Some(fixed) = product.discount_price {
            return fixed.min(product.price);
        }

        if let Some(pct) = product.discount_percentage {
            let discounted = product.price * (Decimal::ONE - pct / Decimal::from(100));
            return round2(discounted).min(product.price);
        }

        product.price
    }

    /// Sum of price deltas for the selected variation options.
    ///
    /// Unknown option groups, unknown values, and non-numeric deltas are
    /// ignored rather than rejected.
    pub fn variation_delta(
        product: &product::Model,
        selections: &HashMap<String, String>,
    ) -> Decimal {
        let Some(variations) = product.variations.as_ref().and_then(|v| v.as_object()) else {
            return Decimal::ZERO;
        };

        let mut delta = Decimal::ZERO;
        for (group, value) in selections {
            let Some(options) = variations.get(group).and_then(|g| g.as_object()) else {
                continue;
            };
            let Some(price) = options.get(value) else {
                continue;
            };
            if let Some(number) = price.as_f64() {
                if let Ok(parsed) = Decimal::from_str(&number.to_string()) {
                    delta += parsed;
                }
            }
        }
        delta
    }

    /// Explicit read of a product's categories through the join table.
    pub async fn categories_for<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<Vec<category::Model>, ServiceError> {
        let links = ProductCategoryEntity::find()
            .filter(product_category::Column::ProductId.eq(product_id))
            .all(conn)
            .await?;

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let category_ids: Vec<Uuid> = links.into_iter().map(|l| l.category_id).collect();
        let categories = CategoryEntity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(conn)
            .await?;
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn test_product(price: Decimal) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            title: "Americano".to_string(),
            description: None,
            price,
            currency: "RUB".to_string(),
            sku: None,
            image_url: None,
            variations: None,
            discount_percentage: None,
            discount_price: None,
            discount_valid_from: None,
            discount_valid_until: None,
            stock_quantity: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn base_price_when_no_discount() {
        let product = test_product(dec!(350.00));
        assert_eq!(
            PricingService::discounted_price(&product, Utc::now()),
            dec!(350.00)
        );
    }

    #[test]
    fn percentage_discount_rounds_half_up() {
        let mut product = test_product(dec!(1000));
        product.discount_percentage = Some(dec!(20));
        assert_eq!(
            PricingService::discounted_price(&product, Utc::now()),
            dec!(800.00)
        );
    }

    #[test]
    fn fixed_price_wins_over_percentage() {
        let mut product = test_product(dec!(1000));
        product.discount_percentage = Some(dec!(20));
        product.discount_price = Some(dec!(750));
        assert_eq!(
            PricingService::discounted_price(&product, Utc::now()),
            dec!(750)
        );
    }

    #[test]
    fn fixed_price_never_exceeds_base() {
        let mut product = test_product(dec!(500));
        product.discount_price = Some(dec!(900));
        assert_eq!(
            PricingService::discounted_price(&product, Utc::now()),
            dec!(500)
        );
    }

    #[test]
    fn discount_outside_window_is_ignored() {
        let now = Utc::now();
        let mut product = test_product(dec!(1000));
        product.discount_percentage = Some(dec!(50));
        product.discount_valid_from = Some(now + Duration::days(1));
        assert_eq!(PricingService::discounted_price(&product, now), dec!(1000));

        product.discount_valid_from = Some(now - Duration::days(2));
        product.discount_valid_until = Some(now - Duration::days(1));
        assert_eq!(PricingService::discounted_price(&product, now), dec!(1000));
    }

    #[test]
    fn discount_inside_window_applies() {
        let now = Utc::now();
        let mut product = test_product(dec!(1000));
        product.discount_percentage = Some(dec!(25));
        product.discount_valid_from = Some(now - Duration::days(1));
        product.discount_valid_until = Some(now + Duration::days(1));
        assert_eq!(
            PricingService::discounted_price(&product, now),
            dec!(750.00)
        );
    }

    #[test]
    fn variation_delta_adds_known_options() {
        let mut product = test_product(dec!(800));
        product.variations = Some(json!({
            "size": {"L": 100, "M": 0},
            "milk": {"oat": 50.5}
        }));

        let mut selections = HashMap::new();
        selections.insert("size".to_string(), "L".to_string());
        selections.insert("milk".to_string(), "oat".to_string());

        assert_eq!(
            PricingService::variation_delta(&product, &selections),
            dec!(150.5)
        );
    }

    #[test]
    fn variation_delta_ignores_unknown_and_non_numeric() {
        let mut product = test_product(dec!(800));
        product.variations = Some(json!({
            "size": {"L": "not-a-number"},
        }));

        let mut selections = HashMap::new();
        selections.insert("size".to_string(), "L".to_string());
        selections.insert("size".to_string(), "XL".to_string());
        selections.insert("color".to_string(), "red".to_string());

        assert_eq!(
            PricingService::variation_delta(&product, &selections),
            Decimal::ZERO
        );
    }

    // Scenario from the pricing contract: base 1000, 20% discount active,
    // size=L adds 100 -> unit price 900.
    #[test]
    fn discounted_base_plus_variation() {
        let mut product = test_product(dec!(1000));
        product.discount_percentage = Some(dec!(20));
        product.variations = Some(json!({"size": {"L": 100}}));

        let mut selections = HashMap::new();
        selections.insert("size".to_string(), "L".to_string());

        let unit = PricingService::discounted_price(&product, Utc::now())
            + PricingService::variation_delta(&product, &selections);
        assert_eq!(unit, dec!(900.00));
    }
}
