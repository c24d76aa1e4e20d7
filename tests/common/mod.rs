use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend as DbBackend, IntoActiveModel, Set,
    Statement,
};
use storefront_api::config::AppConfig;
use storefront_api::db;
use storefront_api::entities::{
    business, category, loyalty_account, product, product_category,
    promocode::{self, DiscountType},
};
use storefront_api::AppState;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Harness spinning up the full application state backed by a throwaway
/// SQLite database. Single connection so transactional tests stay on one
/// handle.
pub struct TestApp {
    pub state: AppState,
    #[allow(dead_code)]
    pub events: mpsc::Receiver<storefront_api::events::Event>,
    db_file: std::path::PathBuf,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4()));
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        for sql in SCHEMA {
            pool.execute(Statement::from_string(DbBackend::Sqlite, (*sql).to_string()))
                .await
                .expect("schema statement");
        }

        let (state, events) = AppState::new(Arc::new(pool), cfg);
        Self {
            state,
            events,
            db_file,
        }
    }

    pub async fn seed_business(&self, slug: &str, loyalty_percent: Decimal) -> business::Model {
        let now = Utc::now();
        business::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(Uuid::new_v4()),
            name: Set(format!("{slug} shop")),
            slug: Set(slug.to_string()),
            description: Set(None),
            timezone: Set(Some("Europe/Moscow".to_string())),
            currency: Set("RUB".to_string()),
            loyalty_points_percent: Set(loyalty_percent),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed business")
    }

    pub async fn seed_product(
        &self,
        business_id: Uuid,
        title: &str,
        price: Decimal,
        stock_quantity: Option<i32>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            title: Set(title.to_string()),
            description: Set(None),
            price: Set(price),
            currency: Set("RUB".to_string()),
            sku: Set(None),
            image_url: Set(None),
            variations: Set(None),
            discount_percentage: Set(None),
            discount_price: Set(None),
            discount_valid_from: Set(None),
            discount_valid_until: Set(None),
            stock_quantity: Set(stock_quantity),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    #[allow(dead_code)]
    pub async fn seed_discounted_product(
        &self,
        business_id: Uuid,
        title: &str,
        price: Decimal,
        discount_percentage: Decimal,
    ) -> product::Model {
        let product = self.seed_product(business_id, title, price, None).await;
        let mut active = product.into_active_model();
        active.discount_percentage = Set(Some(discount_percentage));
        active.update(&*self.state.db).await.expect("apply discount")
    }

    #[allow(dead_code)]
    pub async fn seed_category(
        &self,
        business_id: Uuid,
        name: &str,
        surcharge: Decimal,
    ) -> category::Model {
        let now = Utc::now();
        category::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            name: Set(name.to_string()),
            position: Set(0),
            surcharge: Set(surcharge),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed category")
    }

    #[allow(dead_code)]
    pub async fn link_category(&self, product_id: Uuid, category_id: Uuid) {
        product_category::ActiveModel {
            product_id: Set(product_id),
            category_id: Set(category_id),
        }
        .insert(&*self.state.db)
        .await
        .expect("link category");
    }

    #[allow(dead_code)]
    pub async fn seed_promocode(
        &self,
        business_id: Uuid,
        code: &str,
        discount_type: DiscountType,
        discount_value: Decimal,
    ) -> promocode::Model {
        let now = Utc::now();
        promocode::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            code: Set(code.to_uppercase()),
            description: Set(None),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_amount: Set(None),
            max_discount_amount: Set(None),
            max_uses: Set(None),
            uses_count: Set(0),
            max_uses_per_user: Set(None),
            valid_from: Set(None),
            valid_until: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed promocode")
    }

    /// Gives the user a pre-funded loyalty account.
    #[allow(dead_code)]
    pub async fn seed_loyalty_balance(
        &self,
        business_id: Uuid,
        user_telegram_id: i64,
        balance: Decimal,
    ) -> loyalty_account::Model {
        let now = Utc::now();
        loyalty_account::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            user_telegram_id: Set(user_telegram_id),
            points_balance: Set(balance),
            total_earned: Set(balance),
            total_spent: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed loyalty account")
    }

    /// Rewrites an order's `updated_at`, for retention-window tests.
    #[allow(dead_code)]
    pub async fn backdate_order(&self, order_id: Uuid, updated_at: DateTime<Utc>) {
        self.state
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "UPDATE orders SET updated_at = ? WHERE id = ?",
                [updated_at.into(), order_id.into()],
            ))
            .await
            .expect("backdate order");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS businesses (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        description TEXT,
        timezone TEXT,
        currency TEXT NOT NULL,
        loyalty_points_percent REAL NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY NOT NULL,
        business_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        price REAL NOT NULL,
        currency TEXT NOT NULL,
        sku TEXT,
        image_url TEXT,
        variations TEXT,
        discount_percentage REAL,
        discount_price REAL,
        discount_valid_from TEXT,
        discount_valid_until TEXT,
        stock_quantity INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY NOT NULL,
        business_id TEXT NOT NULL,
        name TEXT NOT NULL,
        position INTEGER NOT NULL DEFAULT 0,
        surcharge REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS product_categories (
        product_id TEXT NOT NULL,
        category_id TEXT NOT NULL,
        PRIMARY KEY (product_id, category_id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS promocodes (
        id TEXT PRIMARY KEY NOT NULL,
        business_id TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        description TEXT,
        discount_type TEXT NOT NULL,
        discount_value REAL NOT NULL,
        min_order_amount REAL,
        max_discount_amount REAL,
        max_uses INTEGER,
        uses_count INTEGER NOT NULL DEFAULT 0,
        max_uses_per_user INTEGER,
        valid_from TEXT,
        valid_until TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS promocode_usages (
        id TEXT PRIMARY KEY NOT NULL,
        promocode_id TEXT NOT NULL,
        order_id TEXT NOT NULL,
        user_telegram_id INTEGER,
        discount_amount REAL NOT NULL,
        order_amount_before REAL NOT NULL,
        order_amount_after REAL NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS loyalty_accounts (
        id TEXT PRIMARY KEY NOT NULL,
        business_id TEXT NOT NULL,
        user_telegram_id INTEGER NOT NULL,
        points_balance REAL NOT NULL DEFAULT 0,
        total_earned REAL NOT NULL DEFAULT 0,
        total_spent REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS loyalty_transactions (
        id TEXT PRIMARY KEY NOT NULL,
        account_id TEXT NOT NULL,
        order_id TEXT,
        transaction_type TEXT NOT NULL,
        points REAL NOT NULL,
        balance_after REAL NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY NOT NULL,
        business_id TEXT NOT NULL,
        user_telegram_id INTEGER,
        customer_name TEXT NOT NULL,
        customer_phone TEXT NOT NULL,
        customer_address TEXT,
        subtotal_amount REAL NOT NULL,
        discount_amount REAL NOT NULL,
        total_amount REAL NOT NULL,
        currency TEXT NOT NULL,
        status TEXT NOT NULL,
        payment_status TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        promocode_id TEXT,
        loyalty_points_earned REAL NOT NULL DEFAULT 0,
        loyalty_points_spent REAL,
        stock_deducted INTEGER NOT NULL DEFAULT 0,
        order_metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS order_items (
        id TEXT PRIMARY KEY NOT NULL,
        order_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        title_snapshot TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL,
        total_price REAL NOT NULL,
        item_metadata TEXT,
        created_at TEXT NOT NULL
    );"#,
];
