//! Order model and related types.

mod model;
mod state;
mod value_objects;

pub use model::{NewOrder, Order, OrderTotals};
pub use state::OrderStatus;
pub use value_objects::{BuyerInfo, Money, OrderItem, PaymentMethod, ProductId};

use thiserror::Error;

/// Errors that can occur while building or transitioning an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The cart has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// A buyer field is blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid quantity.
    #[error("Invalid quantity for {product}: {quantity} (must be between 1 and {max})", max = crate::MAX_LINE_QUANTITY)]
    InvalidQuantity { product: String, quantity: u32 },

    /// Negative catalog price.
    #[error("Invalid price for {product}: {price}")]
    InvalidPrice { product: String, price: Money },

    /// The selected size is not offered for the product.
    #[error("Size {size} is not available for {product}")]
    InvalidSize { product: String, size: String },

    /// Status string outside the canonical vocabulary.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
