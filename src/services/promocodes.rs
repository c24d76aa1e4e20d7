use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{
    order,
    promocode::{self, DiscountType, Entity as PromocodeEntity},
    promocode_usage::{self, Entity as PromocodeUsageEntity},
};
use crate::errors::{PromocodeRejection, ServiceError};
use crate::services::round2;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePromocodeRequest {
    pub business_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Code must be between 1 and 50 characters"))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePromocodeRequest {
    pub description: Option<String>,
    pub discount_value: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// Validates, prices, and records promocode applications.
#[derive(Clone)]
pub struct PromocodeService {
    db: Arc<DbPool>,
}

impl PromocodeService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Codes are stored and matched uppercased and trimmed.
    fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Validates a code against its business rules, in fixed order,
    /// returning the first failing reason.
    ///
    /// Runs against the supplied connection so that, inside a settlement
    /// transaction, the per-user usage count sees rows added earlier in the
    /// same transaction. The promocode row is read with an exclusive lock so
    /// concurrent applications of one code serialize.
    #[instrument(skip(self, conn), fields(business_id = %business_id))]
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        business_id: Uuid,
        order_amount: Decimal,
        user_telegram_id: Option<i64>,
    ) -> Result<promocode::Model, ServiceError> {
        let promocode = PromocodeEntity::find()
            .filter(promocode::Column::Code.eq(Self::normalize(code)))
            .filter(promocode::Column::BusinessId.eq(business_id))
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or(PromocodeRejection::NotFound)?;

        if !promocode.is_active {
            return Err(PromocodeRejection::Inactive.into());
        }

        let now = Utc::now();
        if let Some(from) = promocode.valid_from {
            if now < from {
                return Err(PromocodeRejection::NotYetValid(from).into());
            }
        }
        if let Some(until) = promocode.valid_until {
            if now > until {
                return Err(PromocodeRejection::Expired.into());
            }
        }

        if let Some(min) = promocode.min_order_amount {
            if order_amount < min {
                return Err(PromocodeRejection::BelowMinimum(min).into());
            }
        }

        if let Some(max_uses) = promocode.max_uses {
            if promocode.uses_count >= max_uses {
                return Err(PromocodeRejection::GloballyExhausted.into());
            }
        }

        if let Some(per_user_cap) = promocode.max_uses_per_user {
            let Some(user_id) = user_telegram_id else {
                // Without an identity the cap cannot be enforced, so the
                // code is refused instead of allowing unlimited use.
                return Err(PromocodeRejection::RequiresAuthentication.into());
            };

            let used = PromocodeUsageEntity::find()
                .filter(promocode_usage::Column::PromocodeId.eq(promocode.id))
                .filter(promocode_usage::Column::UserTelegramId.eq(user_id))
                .count(conn)
                .await?;

            if used >= per_user_cap as u64 {
                return Err(PromocodeRejection::PerUserExhausted.into());
            }
        }

        Ok(promocode)
    }

    /// Discount produced by a validated promocode for the given amount.
    /// Percentage discounts are capped by `max_discount_amount`; either type
    /// is capped at the order amount.
    pub fn calculate_discount(promocode: &promocode::Model, order_amount: Decimal) -> Decimal {
        let discount = match promocode.discount_type {
            DiscountType::Percentage => {
                let raw = order_amount * (promocode.discount_value / Decimal::from(100));
                match promocode.max_discount_amount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            DiscountType::Fixed => promocode.discount_value,
        };

        round2(discount.min(order_amount))
    }

    /// Records one application: appends the usage row and bumps the usage
    /// counter. Must run inside the same transaction that persists the
    /// order, never as a separate commit.
    #[instrument(skip(self, conn, promocode, order), fields(promocode_id = %promocode.id, order_id = %order.id))]
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        promocode: &promocode::Model,
        order: &order::Model,
        discount_amount: Decimal,
        order_amount_before: Decimal,
        order_amount_after: Decimal,
    ) -> Result<promocode_usage::Model, ServiceError> {
        let usage = promocode_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            promocode_id: Set(promocode.id),
            order_id: Set(order.id),
            user_telegram_id: Set(order.user_telegram_id),
            discount_amount: Set(discount_amount),
            order_amount_before: Set(order_amount_before),
            order_amount_after: Set(order_amount_after),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        let mut active = promocode.clone().into_active_model();
        active.uses_count = Set(promocode.uses_count + 1);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        info!(code = %promocode.code, discount = %discount_amount, "Promocode applied");
        Ok(usage)
    }

    /// Creates a promocode, enforcing code uniqueness.
    #[instrument(skip(self, request), fields(business_id = %request.business_id))]
    pub async fn create(
        &self,
        request: CreatePromocodeRequest,
    ) -> Result<promocode::Model, ServiceError> {
        request.validate()?;

        if request.discount_type == DiscountType::Percentage
            && (request.discount_value <= Decimal::ZERO
                || request.discount_value > Decimal::from(100))
        {
            return Err(ServiceError::ValidationError(
                "Percentage discount must be between 0 and 100".to_string(),
            ));
        }
        if request.discount_type == DiscountType::Fixed && request.discount_value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Fixed discount must be positive".to_string(),
            ));
        }

        let code = Self::normalize(&request.code);
        let existing = PromocodeEntity::find()
            .filter(promocode::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Promocode '{code}' already exists"
            )));
        }

        let now = Utc::now();
        let promocode = promocode::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(request.business_id),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            min_order_amount: Set(request.min_order_amount),
            max_discount_amount: Set(request.max_discount_amount),
            max_uses: Set(request.max_uses),
            uses_count: Set(0),
            max_uses_per_user: Set(request.max_uses_per_user),
            valid_from: Set(request.valid_from),
            valid_until: Set(request.valid_until),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(promocode_id = %promocode.id, code = %promocode.code, "Promocode created");
        Ok(promocode)
    }

    /// Partial update; absent fields are left untouched.
    #[instrument(skip(self, request), fields(promocode_id = %promocode_id))]
    pub async fn update(
        &self,
        promocode_id: Uuid,
        request: UpdatePromocodeRequest,
    ) -> Result<promocode::Model, ServiceError> {
        let promocode = self
            .get_by_id(promocode_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promocode {promocode_id} not found")))?;

        let mut active = promocode.into_active_model();
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(value) = request.discount_value {
            active.discount_value = Set(value);
        }
        if let Some(min) = request.min_order_amount {
            active.min_order_amount = Set(Some(min));
        }
        if let Some(max) = request.max_discount_amount {
            active.max_discount_amount = Set(Some(max));
        }
        if let Some(max_uses) = request.max_uses {
            active.max_uses = Set(Some(max_uses));
        }
        if let Some(per_user) = request.max_uses_per_user {
            active.max_uses_per_user = Set(Some(per_user));
        }
        if let Some(from) = request.valid_from {
            active.valid_from = Set(Some(from));
        }
        if let Some(until) = request.valid_until {
            active.valid_until = Set(Some(until));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    pub async fn get_by_id(
        &self,
        promocode_id: Uuid,
    ) -> Result<Option<promocode::Model>, ServiceError> {
        Ok(PromocodeEntity::find_by_id(promocode_id)
            .one(&*self.db)
            .await?)
    }

    pub async fn list_by_business(
        &self,
        business_id: Uuid,
        is_active: Option<bool>,
    ) -> Result<Vec<promocode::Model>, ServiceError> {
        let mut query =
            PromocodeEntity::find().filter(promocode::Column::BusinessId.eq(business_id));
        if let Some(active) = is_active {
            query = query.filter(promocode::Column::IsActive.eq(active));
        }
        Ok(query
            .order_by_desc(promocode::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self), fields(promocode_id = %promocode_id))]
    pub async fn delete(&self, promocode_id: Uuid) -> Result<bool, ServiceError> {
        let result = PromocodeEntity::delete_by_id(promocode_id)
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_promocode(discount_type: DiscountType, value: Decimal) -> promocode::Model {
        promocode::Model {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            description: None,
            discount_type,
            discount_value: value,
            min_order_amount: None,
            max_discount_amount: None,
            max_uses: None,
            uses_count: 0,
            max_uses_per_user: None,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_discount_capped_by_max_amount() {
        let mut promocode = test_promocode(DiscountType::Percentage, dec!(10));
        promocode.max_discount_amount = Some(dec!(300));
        // 10% of 5000 is 500, capped at 300.
        assert_eq!(
            PromocodeService::calculate_discount(&promocode, dec!(5000)),
            dec!(300)
        );
    }

    #[test]
    fn percentage_discount_uncapped() {
        let promocode = test_promocode(DiscountType::Percentage, dec!(10));
        assert_eq!(
            PromocodeService::calculate_discount(&promocode, dec!(5000)),
            dec!(500.00)
        );
    }

    #[test]
    fn fixed_discount_never_exceeds_order_amount() {
        let promocode = test_promocode(DiscountType::Fixed, dec!(700));
        assert_eq!(
            PromocodeService::calculate_discount(&promocode, dec!(400)),
            dec!(400)
        );
    }

    #[test]
    fn discount_rounds_to_two_decimals() {
        let promocode = test_promocode(DiscountType::Percentage, dec!(7.5));
        // 7.5% of 333.33 = 24.99975 -> 25.00
        assert_eq!(
            PromocodeService::calculate_discount(&promocode, dec!(333.33)),
            dec!(25.00)
        );
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(PromocodeService::normalize("  save10 "), "SAVE10");
    }
}
