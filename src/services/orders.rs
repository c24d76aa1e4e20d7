use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cache::{business_key, InMemoryCache};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{
    business::{self, Entity as BusinessEntity},
    order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
    order_item::{self, Entity as OrderItemEntity},
    product::Entity as ProductEntity,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::delivery::{DeliveryAddress, DeliveryQuote, DeliveryService, QuoteItem};
use crate::services::geocoding::GeocodingService;
use crate::services::loyalty::LoyaltyService;
use crate::services::pricing::{PricingService, ResolvedLine};
use crate::services::promocodes::PromocodeService;
use crate::services::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Delivery => "delivery",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Selected variation values keyed by option group name.
    pub selected_variations: Option<HashMap<String, String>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Business slug is required"))]
    pub business_slug: String,
    pub user_telegram_id: Option<i64>,

    #[validate(length(min = 1, max = 255, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(min = 1, max = 50, message = "Customer phone is required"))]
    pub customer_phone: String,
    pub customer_address: Option<String>,

    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,

    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderLineRequest>,

    pub promocode: Option<String>,
    pub loyalty_points_to_spend: Option<Decimal>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_telegram_id: Option<i64>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: Option<String>,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: PaymentMethod,
    pub promocode_id: Option<Uuid>,
    pub loyalty_points_earned: Decimal,
    pub loyalty_points_spent: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

/// Composes pricing, delivery, promocode, and loyalty into one settlement
/// transaction, and owns the status state machine with its stock and accrual
/// side effects.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    config: Arc<AppConfig>,
    cache: InMemoryCache,
    event_sender: Option<Arc<EventSender>>,
    pricing: PricingService,
    delivery: DeliveryService,
    geocoding: GeocodingService,
    promocodes: PromocodeService,
    loyalty: LoyaltyService,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        cache: InMemoryCache,
        event_sender: Option<Arc<EventSender>>,
        pricing: PricingService,
        delivery: DeliveryService,
        geocoding: GeocodingService,
        promocodes: PromocodeService,
        loyalty: LoyaltyService,
    ) -> Self {
        Self {
            db,
            config,
            cache,
            event_sender,
            pricing,
            delivery,
            geocoding,
            promocodes,
            loyalty,
        }
    }

    /// Business lookup by slug, cached with the configured TTL.
    #[instrument(skip(self))]
    pub async fn find_business_by_slug(&self, slug: &str) -> Result<business::Model, ServiceError> {
        let key = business_key(slug);
        if let Some(cached) = self.cache.get_json::<business::Model>(&key) {
            return Ok(cached);
        }

        let business = BusinessEntity::find()
            .filter(business::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Business '{slug}' not found")))?;

        let ttl = std::time::Duration::from_secs(self.config.cache_ttl_secs);
        if let Err(e) = self.cache.set_json(&key, &business, Some(ttl)) {
            warn!(slug = slug, error = %e, "Failed to cache business");
        }
        Ok(business)
    }

    /// Drops the cached business entry; call after tenant settings change.
    pub fn invalidate_business(&self, slug: &str) {
        self.cache.delete(&business_key(slug));
    }

    /// Settles a cart into a persisted order.
    ///
    /// External lookups (geocoding, delivery quote) run before the
    /// persistence transaction opens so network latency never holds locks.
    /// Promocode failures abort checkout; delivery failures degrade to zero
    /// cost.
    #[instrument(skip(self, request), fields(business_slug = %request.business_slug))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        for line in &request.items {
            line.validate()?;
        }

        let business = self.find_business_by_slug(&request.business_slug).await?;
        let now = Utc::now();

        let mut lines: Vec<(OrderLineRequest, ResolvedLine)> = Vec::with_capacity(request.items.len());
        let mut goods_total = Decimal::ZERO;
        let mut surcharge_total = Decimal::ZERO;
        for line_request in &request.items {
            let resolved = self
                .pricing
                .resolve_line(
                    &*self.db,
                    business.id,
                    line_request.product_id,
                    line_request.quantity,
                    line_request.selected_variations.as_ref(),
                )
                .await?;
            goods_total += resolved.line_total;
            surcharge_total += resolved.surcharge_total;
            lines.push((line_request.clone(), resolved));
        }

        let delivery_quote = self.estimate_delivery(&request, &lines).await;
        let subtotal = round2(goods_total + surcharge_total + delivery_quote.cost);

        let txn = self.db.begin().await?;

        let mut promocode_discount = Decimal::ZERO;
        let mut applied_promocode = None;
        if let Some(code) = request.promocode.as_deref().map(str::trim) {
            if !code.is_empty() {
                let promocode = self
                    .promocodes
                    .validate(&txn, code, business.id, subtotal, request.user_telegram_id)
                    .await?;
                promocode_discount = PromocodeService::calculate_discount(&promocode, subtotal);
                applied_promocode = Some(promocode);
            }
        }

        let mut loyalty_spend = Decimal::ZERO;
        if let (Some(requested), Some(_)) =
            (request.loyalty_points_to_spend, request.user_telegram_id)
        {
            if requested > Decimal::ZERO {
                let remaining = subtotal - promocode_discount;
                let capped_points = LoyaltyService::cap_redemption(requested, remaining);
                // Points are pegged to the currency, so the capped spend is
                // also the discount.
                loyalty_spend =
                    LoyaltyService::calculate_discount_from_points(capped_points, Decimal::ONE)?;
            }
        }

        let discount_amount = round2(promocode_discount + loyalty_spend);
        let total_amount = round2((subtotal - discount_amount).max(Decimal::ZERO));

        let points_earned = match request.user_telegram_id {
            Some(_) if total_amount > Decimal::ZERO => LoyaltyService::calculate_points_earned(
                total_amount,
                business.loyalty_points_percent,
            )?,
            _ => Decimal::ZERO,
        };

        let order_metadata = json!({
            "delivery_method": request.delivery_method.as_str(),
            "delivery_cost": delivery_quote.cost,
            "delivery_tier": &delivery_quote.tier,
            "comment": &request.comment,
        });

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business.id),
            user_telegram_id: Set(request.user_telegram_id),
            customer_name: Set(request.customer_name.clone()),
            customer_phone: Set(request.customer_phone.clone()),
            customer_address: Set(request.customer_address.clone()),
            subtotal_amount: Set(subtotal),
            discount_amount: Set(discount_amount),
            total_amount: Set(total_amount),
            currency: Set(business.currency.clone()),
            status: Set(OrderStatus::New),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(request.payment_method),
            promocode_id: Set(applied_promocode.as_ref().map(|p| p.id)),
            loyalty_points_earned: Set(points_earned),
            loyalty_points_spent: Set((loyalty_spend > Decimal::ZERO).then_some(loyalty_spend)),
            stock_deducted: Set(false),
            order_metadata: Set(Some(order_metadata)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (line_request, resolved) in &lines {
            let item_metadata = json!({
                "selected_variations": &line_request.selected_variations,
                "note": &line_request.note,
                "category_names": resolved
                    .categories
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>(),
                "surcharge_per_unit": resolved.surcharge_per_unit,
            });
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(resolved.product.id),
                title_snapshot: Set(resolved.product.title.clone()),
                quantity: Set(resolved.quantity),
                unit_price: Set(resolved.unit_price),
                total_price: Set(resolved.line_total),
                item_metadata: Set(Some(item_metadata)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        if let Some(promocode) = &applied_promocode {
            self.promocodes
                .apply(
                    &txn,
                    promocode,
                    &order,
                    promocode_discount,
                    subtotal,
                    round2(subtotal - promocode_discount),
                )
                .await?;
        }

        if loyalty_spend > Decimal::ZERO {
            if let Some(user_id) = request.user_telegram_id {
                self.loyalty
                    .spend_points(
                        &txn,
                        business.id,
                        user_id,
                        loyalty_spend,
                        Some(order.id),
                        Some("Redeemed at checkout".to_string()),
                    )
                    .await?;
            }
        }

        txn.commit().await?;

        info!(
            order_id = %order.id,
            total = %order.total_amount,
            discount = %order.discount_amount,
            "Order created"
        );
        self.emit(Event::OrderCreated(order.id)).await;

        Ok(Self::model_to_response(order, items))
    }

    /// Best-effort delivery estimation; pickup orders and missing addresses
    /// cost zero, and provider failures degrade to zero.
    async fn estimate_delivery(
        &self,
        request: &CreateOrderRequest,
        lines: &[(OrderLineRequest, ResolvedLine)],
    ) -> DeliveryQuote {
        if request.delivery_method != DeliveryMethod::Delivery {
            return DeliveryQuote::zero();
        }
        let Some(address) = request.customer_address.as_deref().filter(|a| !a.trim().is_empty())
        else {
            warn!("Delivery requested without an address; estimating zero cost");
            return DeliveryQuote::zero();
        };

        let pickup = &self.config.pickup;
        let destination_coordinates = match self.geocoding.geocode(address).await {
            Some((lon, lat)) => [lon, lat],
            None => pickup.default_destination,
        };

        let from = DeliveryAddress {
            fullname: pickup.fullname.clone(),
            coordinates: pickup.coordinates,
            city: pickup.city.clone(),
            country: pickup.country.clone(),
            street: pickup.street.clone(),
        };
        let to = DeliveryAddress {
            fullname: address.to_string(),
            coordinates: destination_coordinates,
            city: pickup.city.clone(),
            country: pickup.country.clone(),
            street: address.to_string(),
        };
        let items: Vec<QuoteItem> = lines
            .iter()
            .map(|(line, _)| QuoteItem::estimated(line.quantity))
            .collect();

        self.delivery.cheapest_offer(&from, &to, &items).await
    }

    /// Applies one step of the status state machine.
    ///
    /// Entering `accepted` deducts stock for every line; any shortfall
    /// aborts the whole transition. Cancelling after acceptance restores the
    /// deducted stock. Both side effects are guarded by `stock_deducted` so
    /// they never double-apply.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = new_status.as_str()))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "{} -> {}",
                old_status.as_str(),
                new_status.as_str()
            )));
        }

        let mut stock_deducted = order.stock_deducted;
        match new_status {
            OrderStatus::Accepted if !stock_deducted => {
                self.deduct_stock(&txn, order_id).await?;
                stock_deducted = true;
            }
            OrderStatus::Cancelled if stock_deducted => {
                self.restore_stock(&txn, order_id).await?;
                stock_deducted = false;
            }
            _ => {}
        }

        let mut active = order.into_active_model();
        active.status = Set(new_status);
        active.stock_deducted = Set(stock_deducted);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            old_status = old_status.as_str(),
            new_status = new_status.as_str(),
            "Order status changed"
        );
        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
        })
        .await;
        if new_status == OrderStatus::Cancelled {
            self.emit(Event::OrderCancelled(order_id)).await;
        }

        Ok(updated)
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.update_status(order_id, OrderStatus::Cancelled).await
    }

    /// Decrements tracked stock for every line item, each product row under
    /// an exclusive lock. Untracked products (stock `None`) are skipped.
    async fn deduct_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?;

        for item in items {
            let product = ProductEntity::find_by_id(item.product_id)
                .lock_exclusive()
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            if let Some(stock) = product.stock_quantity {
                if stock < item.quantity {
                    return Err(ServiceError::InsufficientStock(format!(
                        "'{}': available {}, requested {}",
                        product.title, stock, item.quantity
                    )));
                }
                let mut active = product.into_active_model();
                active.stock_quantity = Set(Some(stock - item.quantity));
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
            }
        }
        Ok(())
    }

    /// Reverses `deduct_stock` for a cancelled order.
    async fn restore_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?;

        for item in items {
            let product = ProductEntity::find_by_id(item.product_id)
                .lock_exclusive()
                .one(conn)
                .await?;
            // Deleted products have nothing to restore.
            let Some(product) = product else { continue };

            if let Some(stock) = product.stock_quantity {
                let mut active = product.into_active_model();
                active.stock_quantity = Set(Some(stock + item.quantity));
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
            }
        }
        Ok(())
    }

    /// Confirms payment. Calling on an already-paid order is a no-op so
    /// duplicate webhook deliveries are harmless. Accrual runs after the
    /// payment commit and its failure never fails the confirmation.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.payment_status == PaymentStatus::Paid {
            txn.commit().await?;
            return Ok(order);
        }
        if !order.payment_status.can_transition_to(PaymentStatus::Paid) {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "payment {} -> paid",
                order.payment_status.as_str()
            )));
        }

        let mut active = order.into_active_model();
        active.payment_status = Set(PaymentStatus::Paid);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!("Payment confirmed");
        self.emit(Event::PaymentStatusChanged {
            order_id,
            payment_status: PaymentStatus::Paid.as_str().to_string(),
        })
        .await;

        if let Err(e) = self.award_points_for_order(order_id).await {
            error!(order_id = %order_id, error = %e, "Loyalty accrual failed after payment");
        }

        Ok(updated)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_failed(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.set_payment_status(order_id, PaymentStatus::Failed)
            .await
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_refunded(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.set_payment_status(order_id, PaymentStatus::Refunded)
            .await
    }

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if !order.payment_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "payment {} -> {}",
                order.payment_status.as_str(),
                new_status.as_str()
            )));
        }

        let mut active = order.into_active_model();
        active.payment_status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(payment_status = new_status.as_str(), "Payment status changed");
        self.emit(Event::PaymentStatusChanged {
            order_id,
            payment_status: new_status.as_str().to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Credits the order's recorded `loyalty_points_earned` once. Returns
    /// `false` when an earned ledger row for this order already exists or
    /// there is nothing to credit.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn award_points_for_order(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let Some(user_id) = order.user_telegram_id else {
            return Ok(false);
        };
        if order.loyalty_points_earned <= Decimal::ZERO {
            return Ok(false);
        }
        if self.loyalty.has_earned_for_order(&txn, order_id).await? {
            info!("Loyalty points already awarded for this order");
            return Ok(false);
        }

        let points = order.loyalty_points_earned;
        self.loyalty
            .earn_points(
                &txn,
                order.business_id,
                user_id,
                points,
                Some(order_id),
                Some("Order payment reward".to_string()),
            )
            .await?;

        txn.commit().await?;

        self.emit(Event::LoyaltyPointsAwarded { order_id, points }).await;
        Ok(true)
    }

    /// Hard-deletes terminal orders whose last update is older than the
    /// retention window. Line items go first so foreign keys never dangle.
    /// Returns the number of orders removed.
    #[instrument(skip(self))]
    pub async fn delete_old_orders(&self, retention_days: u32) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));

        let txn = self.db.begin().await?;

        let expired: Vec<Uuid> = OrderEntity::find()
            .filter(
                order::Column::Status
                    .is_in([OrderStatus::Cancelled, OrderStatus::Completed]),
            )
            .filter(order::Column::UpdatedAt.lt(cutoff))
            .all(&txn)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.is_in(expired.clone()))
            .exec(&txn)
            .await?;
        let deleted = OrderEntity::delete_many()
            .filter(order::Column::Id.is_in(expired))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(deleted = deleted.rows_affected, "Retention sweep completed");
        Ok(deleted.rows_affected)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(Self::model_to_response(order, items))
    }

    pub async fn list_by_business_slug(
        &self,
        slug: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let business = self.find_business_by_slug(slug).await?;
        self.paginate_orders(
            OrderEntity::find().filter(order::Column::BusinessId.eq(business.id)),
            page,
            limit,
        )
        .await
    }

    pub async fn list_by_user(
        &self,
        user_telegram_id: i64,
        business_slug: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let business = self.find_business_by_slug(business_slug).await?;
        self.paginate_orders(
            OrderEntity::find()
                .filter(order::Column::BusinessId.eq(business.id))
                .filter(order::Column::UserTelegramId.eq(user_telegram_id)),
            page,
            limit,
        )
        .await
    }

    async fn paginate_orders(
        &self,
        query: sea_orm::Select<OrderEntity>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order.id))
                .all(&*self.db)
                .await?;
            responses.push(Self::model_to_response(order, items));
        }
        Ok((responses, total))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!("Failed to send event: {}", e);
            }
        }
    }

    fn model_to_response(order: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
        OrderResponse {
            id: order.id,
            business_id: order.business_id,
            user_telegram_id: order.user_telegram_id,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            customer_address: order.customer_address,
            subtotal_amount: order.subtotal_amount,
            discount_amount: order.discount_amount,
            total_amount: order.total_amount,
            currency: order.currency,
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            payment_method: order.payment_method,
            promocode_id: order.promocode_id,
            loyalty_points_earned: order.loyalty_points_earned,
            loyalty_points_spent: order.loyalty_points_spent,
            metadata: order.order_metadata,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    title: item.title_snapshot,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                    metadata: item.item_metadata,
                })
                .collect(),
            created_at: order.created_at,
        }
    }
}
