//! Domain layer for the storefront checkout system.
//!
//! This crate provides the pure building blocks shared by the store, the
//! checkout orchestrator and the HTTP layer:
//! - `Money` in canonical minor units and the currency normalizer
//! - the canonical `OrderStatus` state machine
//! - `Order`, `OrderItem` and the validated `NewOrder` constructor
//! - catalog `Product` records and cart identifier parsing

pub mod currency;
pub mod order;
pub mod product;

pub use common::OrderId;
pub use currency::{Currency, CurrencyAmount};
pub use order::{
    BuyerInfo, Money, NewOrder, Order, OrderError, OrderItem, OrderStatus, OrderTotals,
    PaymentMethod, ProductId,
};
pub use product::{MAX_LINE_QUANTITY, Product, ProductRef};
