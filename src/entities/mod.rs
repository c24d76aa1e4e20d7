pub mod business;
pub mod category;
pub mod loyalty_account;
pub mod loyalty_transaction;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_category;
pub mod promocode;
pub mod promocode_usage;

// Re-export entities
pub use business::{Entity as Business, Model as BusinessModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use loyalty_account::{Entity as LoyaltyAccount, Model as LoyaltyAccountModel};
pub use loyalty_transaction::{
    Entity as LoyaltyTransaction, LoyaltyTransactionType, Model as LoyaltyTransactionModel,
};
pub use order::{
    Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_category::{Entity as ProductCategory, Model as ProductCategoryModel};
pub use promocode::{DiscountType, Entity as Promocode, Model as PromocodeModel};
pub use promocode_usage::{Entity as PromocodeUsage, Model as PromocodeUsageModel};
