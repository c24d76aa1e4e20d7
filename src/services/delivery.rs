use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::DeliveryConfig;
use crate::errors::ServiceError;

const CALCULATE_ENDPOINT: &str = "/b2b/cargo/integration/v2/offers/calculate";

/// Service tiers attempted for every estimate, cheapest offer wins.
const DEFAULT_TIERS: [&str; 2] = ["courier", "express"];

/// Surge multiplier above which the selected offer is logged loudly.
const SURGE_WARN_THRESHOLD: f64 = 1.5;

/// One end of a delivery route.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAddress {
    pub fullname: String,
    /// [longitude, latitude]
    pub coordinates: [f64; 2],
    pub city: String,
    pub country: String,
    pub street: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSize {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// A parcel line sent to the quote API.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteItem {
    pub quantity: i32,
    pub pickup_point: i32,
    pub dropoff_point: i32,
    /// Kilograms.
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<ItemSize>,
}

impl QuoteItem {
    /// Conservative estimate for a cart line: 0.1 kg per unit and minimal
    /// dimensions, which keeps quotes at the provider's floor.
    pub fn estimated(quantity: i32) -> Self {
        Self {
            quantity,
            pickup_point: 1,
            dropoff_point: 2,
            weight: 0.1 * quantity as f64,
            size: Some(ItemSize {
                length: 0.05,
                width: 0.05,
                height: 0.05,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferPrice {
    pub total_price: String,
    #[serde(default)]
    pub total_price_with_vat: Option<String>,
    #[serde(default)]
    pub surge_ratio: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Offer {
    #[serde(default)]
    pub taxi_class: Option<String>,
    pub price: OfferPrice,
}

impl Offer {
    /// Price used for offer comparison: with-tax price when present, base
    /// price otherwise, unparseable prices sort last.
    pub fn effective_price(&self) -> Decimal {
        let raw = self
            .price
            .total_price_with_vat
            .as_deref()
            .unwrap_or(&self.price.total_price);
        Decimal::from_str(raw).unwrap_or(Decimal::MAX)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

/// Outcome of a degraded-path-safe estimate. `cost` is zero whenever no
/// viable offer was found.
#[derive(Debug, Clone)]
pub struct DeliveryQuote {
    pub cost: Decimal,
    pub tier: Option<String>,
    pub surge_ratio: Option<f64>,
}

impl DeliveryQuote {
    pub fn zero() -> Self {
        Self {
            cost: Decimal::ZERO,
            tier: None,
            surge_ratio: None,
        }
    }
}

/// Adapter over the external routing/quote provider.
///
/// Delivery estimation is advisory: any provider failure degrades to a
/// zero-cost quote instead of failing checkout.
#[derive(Clone)]
pub struct DeliveryService {
    config: DeliveryConfig,
    client: reqwest::Client,
    missing_token_reported: Arc<AtomicBool>,
}

impl DeliveryService {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            missing_token_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests offers for the given service tiers.
    ///
    /// Unlike [`cheapest_offer`](Self::cheapest_offer) this surfaces
    /// provider failures to the caller.
    #[instrument(skip(self, from, to, items), fields(tiers = ?tiers))]
    pub async fn quote(
        &self,
        from: &DeliveryAddress,
        to: &DeliveryAddress,
        items: &[QuoteItem],
        tiers: &[&str],
    ) -> Result<QuoteResponse, ServiceError> {
        let token = self.config.token.as_deref().ok_or_else(|| {
            ServiceError::ExternalServiceError("Delivery provider token not configured".to_string())
        })?;

        let payload = json!({
            "items": items,
            "route_points": [
                {
                    "id": 1,
                    "fullname": from.fullname,
                    "coordinates": from.coordinates,
                    "city": from.city,
                    "country": from.country,
                    "street": from.street,
                },
                {
                    "id": 2,
                    "fullname": to.fullname,
                    "coordinates": to.coordinates,
                    "city": to.city,
                    "country": to.country,
                    "street": to.street,
                },
            ],
            "requirements": { "taxi_classes": tiers },
        });

        let url = format!("{}{}", self.config.base_url, CALCULATE_ENDPOINT);
        debug!(url = %url, "Requesting delivery quote");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Delivery quote request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "Delivery quote API error: {status} - {body}"
            )));
        }

        let quote: QuoteResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid delivery quote response: {e}"))
        })?;

        info!(offers = quote.offers.len(), "Delivery quote received");
        Ok(quote)
    }

    /// Attempts every default tier independently and returns the cheapest
    /// collected offer. Never fails: tier failures are skipped and an empty
    /// result degrades to a zero-cost quote.
    #[instrument(skip(self, from, to, items))]
    pub async fn cheapest_offer(
        &self,
        from: &DeliveryAddress,
        to: &DeliveryAddress,
        items: &[QuoteItem],
    ) -> DeliveryQuote {
        if self.config.token.is_none() {
            if !self.missing_token_reported.swap(true, Ordering::Relaxed) {
                warn!("Delivery provider token not configured; all estimates degrade to zero cost");
            }
            return DeliveryQuote::zero();
        }

        let mut offers: Vec<Offer> = Vec::new();
        for tier in DEFAULT_TIERS {
            match self.quote(from, to, items, &[tier]).await {
                Ok(response) => {
                    offers.extend(
                        response
                            .offers
                            .into_iter()
                            .filter(|o| o.taxi_class.as_deref() == Some(tier)),
                    );
                }
                Err(e) => {
                    warn!(tier = tier, error = %e, "Delivery tier quote failed, skipping");
                }
            }
        }

        match select_cheapest(offers) {
            Some(offer) => {
                let cost = offer.effective_price();
                let surge = offer.price.surge_ratio;
                if let Some(ratio) = surge {
                    if ratio > SURGE_WARN_THRESHOLD {
                        warn!(surge_ratio = ratio, cost = %cost, "High surge pricing on selected delivery offer");
                    }
                }
                info!(cost = %cost, tier = ?offer.taxi_class, "Delivery cost selected");
                DeliveryQuote {
                    cost,
                    tier: offer.taxi_class,
                    surge_ratio: surge,
                }
            }
            None => {
                warn!("No delivery offers found, delivery cost set to 0");
                DeliveryQuote::zero()
            }
        }
    }
}

fn select_cheapest(offers: Vec<Offer>) -> Option<Offer> {
    offers.into_iter().min_by_key(|o| o.effective_price())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn offer(tier: &str, total: &str, with_vat: Option<&str>) -> Offer {
        Offer {
            taxi_class: Some(tier.to_string()),
            price: OfferPrice {
                total_price: total.to_string(),
                total_price_with_vat: with_vat.map(str::to_string),
                surge_ratio: None,
                currency: Some("RUB".to_string()),
            },
        }
    }

    #[test]
    fn with_vat_price_preferred_for_comparison() {
        let o = offer("courier", "100.00", Some("120.00"));
        assert_eq!(o.effective_price(), dec!(120.00));
    }

    #[test]
    fn base_price_used_when_no_vat_price() {
        let o = offer("courier", "150.00", None);
        assert_eq!(o.effective_price(), dec!(150.00));
    }

    #[test]
    fn unparseable_price_sorts_last() {
        let offers = vec![
            offer("courier", "garbage", None),
            offer("express", "200.00", None),
        ];
        let cheapest = select_cheapest(offers).unwrap();
        assert_eq!(cheapest.taxi_class.as_deref(), Some("express"));
    }

    #[test]
    fn cheapest_offer_wins_across_tiers() {
        let offers = vec![
            offer("express", "250.00", Some("300.00")),
            offer("courier", "180.00", Some("216.00")),
        ];
        let cheapest = select_cheapest(offers).unwrap();
        assert_eq!(cheapest.taxi_class.as_deref(), Some("courier"));
        assert_eq!(cheapest.effective_price(), dec!(216.00));
    }

    #[test]
    fn no_offers_selects_nothing() {
        assert!(select_cheapest(Vec::new()).is_none());
    }

    #[test]
    fn estimated_item_weight_scales_with_quantity() {
        let item = QuoteItem::estimated(3);
        assert!((item.weight - 0.3).abs() < f64::EPSILON);
        assert_eq!(item.quantity, 3);
    }

    #[tokio::test]
    async fn unconfigured_token_degrades_to_zero() {
        let service = DeliveryService::new(DeliveryConfig::default());
        let address = DeliveryAddress {
            fullname: "somewhere".to_string(),
            coordinates: [37.6, 55.8],
            city: "Москва".to_string(),
            country: "Россия".to_string(),
            street: "somewhere".to_string(),
        };
        let quote = service
            .cheapest_offer(&address, &address, &[QuoteItem::estimated(1)])
            .await;
        assert_eq!(quote.cost, Decimal::ZERO);
        assert!(quote.tier.is_none());
    }
}
