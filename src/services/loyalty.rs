use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    loyalty_account::{self, Entity as LoyaltyAccountEntity},
    loyalty_transaction::{self, Entity as LoyaltyTransactionEntity, LoyaltyTransactionType},
};
use crate::errors::ServiceError;
use crate::services::round2;

/// Redemption may cover at most this share of the amount it applies to.
const MAX_REDEMPTION_SHARE: Decimal = Decimal::from_parts(90, 0, 0, false, 2);

/// Per-business, per-user points ledger. Every balance change appends a
/// transaction row carrying the balance after the change, so the history
/// replays to the stored balance.
#[derive(Clone)]
pub struct LoyaltyService {
    db: Arc<DbPool>,
}

impl LoyaltyService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fetches the account for this business and user, creating a zeroed one
    /// on first contact.
    #[instrument(skip(self, conn), fields(business_id = %business_id, user_telegram_id = user_telegram_id))]
    pub async fn get_or_create_account<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        user_telegram_id: i64,
    ) -> Result<loyalty_account::Model, ServiceError> {
        if let Some(account) = self
            .find_account(conn, business_id, user_telegram_id)
            .await?
        {
            return Ok(account);
        }

        let now = Utc::now();
        let account = loyalty_account::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            user_telegram_id: Set(user_telegram_id),
            points_balance: Set(Decimal::ZERO),
            total_earned: Set(Decimal::ZERO),
            total_spent: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        info!(account_id = %account.id, "Loyalty account created");
        Ok(account)
    }

    pub async fn get_account(
        &self,
        business_id: Uuid,
        user_telegram_id: i64,
    ) -> Result<Option<loyalty_account::Model>, ServiceError> {
        self.find_account(&*self.db, business_id, user_telegram_id)
            .await
    }

    async fn find_account<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        user_telegram_id: i64,
    ) -> Result<Option<loyalty_account::Model>, ServiceError> {
        Ok(LoyaltyAccountEntity::find()
            .filter(loyalty_account::Column::BusinessId.eq(business_id))
            .filter(loyalty_account::Column::UserTelegramId.eq(user_telegram_id))
            .one(conn)
            .await?)
    }

    /// Credits points to the account and appends an `earned` transaction.
    /// Caller supplies the connection; inside a settlement transaction the
    /// credit commits or rolls back with the order.
    #[instrument(skip(self, conn), fields(business_id = %business_id, user_telegram_id = user_telegram_id, points = %points))]
    pub async fn earn_points<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        user_telegram_id: i64,
        points: Decimal,
        order_id: Option<Uuid>,
        description: Option<String>,
    ) -> Result<loyalty_transaction::Model, ServiceError> {
        if points <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Points to earn must be positive".to_string(),
            ));
        }

        let account = self
            .locked_account(conn, business_id, user_telegram_id)
            .await?;
        let new_balance = round2(account.points_balance + points);
        let new_total_earned = round2(account.total_earned + points);

        let mut active = account.clone().into_active_model();
        active.points_balance = Set(new_balance);
        active.total_earned = Set(new_total_earned);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        let transaction = self
            .record_transaction(
                conn,
                account.id,
                order_id,
                LoyaltyTransactionType::Earned,
                points,
                new_balance,
                description,
            )
            .await?;

        info!(account_id = %account.id, balance = %new_balance, "Loyalty points earned");
        Ok(transaction)
    }

    /// Debits points, failing with the shortfall if the balance does not
    /// cover the debit. Balance never goes negative.
    #[instrument(skip(self, conn), fields(business_id = %business_id, user_telegram_id = user_telegram_id, points = %points))]
    pub async fn spend_points<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        user_telegram_id: i64,
        points: Decimal,
        order_id: Option<Uuid>,
        description: Option<String>,
    ) -> Result<loyalty_transaction::Model, ServiceError> {
        if points <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Points to spend must be positive".to_string(),
            ));
        }

        let account = self
            .locked_account(conn, business_id, user_telegram_id)
            .await?;
        if account.points_balance < points {
            return Err(ServiceError::InsufficientBalance(format!(
                "available {}, requested {}",
                account.points_balance, points
            )));
        }

        let new_balance = round2(account.points_balance - points);
        let new_total_spent = round2(account.total_spent + points);

        let mut active = account.clone().into_active_model();
        active.points_balance = Set(new_balance);
        active.total_spent = Set(new_total_spent);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        let transaction = self
            .record_transaction(
                conn,
                account.id,
                order_id,
                LoyaltyTransactionType::Spent,
                -points,
                new_balance,
                description,
            )
            .await?;

        info!(account_id = %account.id, balance = %new_balance, "Loyalty points spent");
        Ok(transaction)
    }

    /// Account row read under an exclusive lock so concurrent ledger writes
    /// for one account serialize. The account is created first if missing.
    async fn locked_account<C: ConnectionTrait>(
        &self,
        conn: &C,
        business_id: Uuid,
        user_telegram_id: i64,
    ) -> Result<loyalty_account::Model, ServiceError> {
        let account = self
            .get_or_create_account(conn, business_id, user_telegram_id)
            .await?;
        LoyaltyAccountEntity::find_by_id(account.id)
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Loyalty account {} not found", account.id)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_transaction<C: ConnectionTrait>(
        &self,
        conn: &C,
        account_id: Uuid,
        order_id: Option<Uuid>,
        transaction_type: LoyaltyTransactionType,
        points: Decimal,
        balance_after: Decimal,
        description: Option<String>,
    ) -> Result<loyalty_transaction::Model, ServiceError> {
        Ok(loyalty_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            order_id: Set(order_id),
            transaction_type: Set(transaction_type),
            points: Set(points),
            balance_after: Set(balance_after),
            description: Set(description),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?)
    }

    /// Points accrued for a paid order total at the business's percent rate.
    pub fn calculate_points_earned(
        order_total: Decimal,
        percent: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if percent < Decimal::ZERO || percent > Decimal::from(100) {
            return Err(ServiceError::ValidationError(
                "Loyalty percent must be between 0 and 100".to_string(),
            ));
        }
        Ok(round2(order_total * percent / Decimal::from(100)))
    }

    /// Currency value of a points redemption at the given conversion rate
    /// (points per currency unit; 1 means points are pegged to the currency).
    pub fn calculate_discount_from_points(
        points: Decimal,
        points_per_currency: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if points_per_currency <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Points conversion rate must be positive".to_string(),
            ));
        }
        Ok(round2(points / points_per_currency))
    }

    /// Clamps a requested redemption so it never exceeds 90% of the amount
    /// it applies to, nor the amount itself.
    pub fn cap_redemption(requested: Decimal, applicable_amount: Decimal) -> Decimal {
        if applicable_amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let cap = round2(applicable_amount * MAX_REDEMPTION_SHARE);
        requested.min(cap).max(Decimal::ZERO)
    }

    /// Whether an `earned` ledger row already references this order. Read
    /// through the crediting transaction to make accrual idempotent.
    pub async fn has_earned_for_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let count = LoyaltyTransactionEntity::find()
            .filter(loyalty_transaction::Column::OrderId.eq(order_id))
            .filter(
                loyalty_transaction::Column::TransactionType.eq(LoyaltyTransactionType::Earned),
            )
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn account_transactions(
        &self,
        account_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<loyalty_transaction::Model>, ServiceError> {
        Ok(LoyaltyTransactionEntity::find()
            .filter(loyalty_transaction::Column::AccountId.eq(account_id))
            .order_by_desc(loyalty_transaction::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn points_earned_at_percent_rate() {
        assert_eq!(
            LoyaltyService::calculate_points_earned(dec!(1200), dec!(1)).unwrap(),
            dec!(12.00)
        );
        assert_eq!(
            LoyaltyService::calculate_points_earned(dec!(999.99), dec!(5)).unwrap(),
            dec!(50.00)
        );
    }

    #[test]
    fn points_earned_rejects_bad_percent() {
        assert!(LoyaltyService::calculate_points_earned(dec!(100), dec!(101)).is_err());
        assert!(LoyaltyService::calculate_points_earned(dec!(100), dec!(-1)).is_err());
    }

    #[test]
    fn discount_from_points_at_rate() {
        assert_eq!(
            LoyaltyService::calculate_discount_from_points(dec!(150), dec!(1)).unwrap(),
            dec!(150.00)
        );
        assert!(LoyaltyService::calculate_discount_from_points(dec!(150), dec!(0)).is_err());
    }

    #[test]
    fn redemption_capped_at_ninety_percent() {
        assert_eq!(LoyaltyService::cap_redemption(dec!(1000), dec!(1000)), dec!(900.00));
        assert_eq!(LoyaltyService::cap_redemption(dec!(500), dec!(1000)), dec!(500));
        assert_eq!(LoyaltyService::cap_redemption(dec!(100), dec!(0)), dec!(0));
        assert_eq!(LoyaltyService::cap_redemption(dec!(-5), dec!(1000)), dec!(0));
    }

    #[test]
    fn max_redemption_share_is_ninety_percent() {
        assert_eq!(MAX_REDEMPTION_SHARE, dec!(0.90));
    }
}
