//! Storefront API Library
//!
//! Core services for a multi-tenant Telegram Mini App storefront: catalog
//! pricing, delivery quoting, promocodes, loyalty points, and the order
//! settlement pipeline that ties them together.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

use crate::cache::InMemoryCache;
use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::services::{
    delivery::DeliveryService, geocoding::GeocodingService, loyalty::LoyaltyService,
    orders::OrderService, pricing::PricingService, promocodes::PromocodeService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub cache: InMemoryCache,
    pub pricing_service: PricingService,
    pub delivery_service: DeliveryService,
    pub geocoding_service: GeocodingService,
    pub promocode_service: PromocodeService,
    pub loyalty_service: LoyaltyService,
    pub order_service: OrderService,
}

impl AppState {
    /// Wires up every service against a shared connection pool.
    ///
    /// Returns the state together with the event receiver so the caller can
    /// decide how (and whether) to drain domain events.
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig) -> (Self, mpsc::Receiver<Event>) {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::channel(1024);
        let event_sender = EventSender::new(tx);
        let cache = InMemoryCache::new();

        let pricing_service = PricingService::new(db.clone());
        let delivery_service = DeliveryService::new(config.delivery.clone());
        let geocoding_service = GeocodingService::new(config.geocoder.clone());
        let promocode_service = PromocodeService::new(db.clone());
        let loyalty_service = LoyaltyService::new(db.clone());
        let order_service = OrderService::new(
            db.clone(),
            config.clone(),
            cache.clone(),
            Some(Arc::new(event_sender.clone())),
            pricing_service.clone(),
            delivery_service.clone(),
            geocoding_service.clone(),
            promocode_service.clone(),
            loyalty_service.clone(),
        );

        (
            Self {
                db,
                config,
                event_sender,
                cache,
                pricing_service,
                delivery_service,
                geocoding_service,
                promocode_service,
                loyalty_service,
                order_service,
            },
            rx,
        )
    }
}
