//! Checkout error types.

use common::OrderId;
use domain::{OrderError, OrderStatus};
use order_store::StoreError;
use thiserror::Error;

/// Classified failures of the payment provider.
///
/// Raw provider errors never leave the adapter; callers decide between retry
/// and terminal failure from the variant alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure, timeout, 5xx or unreadable response. Safe to retry.
    #[error("Payment provider unavailable: {0}")]
    Transient(String),

    /// The provider rejected our credentials.
    #[error("Payment provider rejected credentials: {0}")]
    Unauthorized(String),

    /// The provider refused the request.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The phone number cannot be turned into an MSISDN.
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
}

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request is malformed or incomplete.
    #[error("{0}")]
    Validation(String),

    /// A cart line names no known product.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's status does not allow the operation.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The payment provider could not be reached. The order is unchanged.
    #[error("Payment provider is temporarily unavailable, please try again")]
    GatewayUnavailable(String),

    /// The payment provider declined the request. The order is unchanged.
    #[error("Payment request was declined, please check the phone number and try again")]
    PaymentDeclined(String),

    /// The payment provider rejected our configuration.
    #[error("Payment provider is misconfigured")]
    GatewayMisconfigured(String),

    /// The provider accepted a payment request but the order could not be
    /// updated to reflect it.
    #[error("Payment {reference} for order {order_id} was accepted but could not be recorded")]
    PaymentNotRecorded { order_id: OrderId, reference: String },

    /// Storage failure.
    #[error("Order store error: {0}")]
    Store(StoreError),
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        CheckoutError::Validation(err.to_string())
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            StoreError::EmptyOrder(_) => CheckoutError::Validation(err.to_string()),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transient(msg) => CheckoutError::GatewayUnavailable(msg),
            GatewayError::Unauthorized(msg) => CheckoutError::GatewayMisconfigured(msg),
            GatewayError::Declined(msg) => CheckoutError::PaymentDeclined(msg),
            GatewayError::InvalidPhone(_) => CheckoutError::Validation(err.to_string()),
        }
    }
}

/// Reasons a webhook delivery is rejected.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The shared secret is missing or wrong.
    #[error("Unauthorized")]
    Unauthorized,

    /// The body is not a callback payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The payload carries no order reference.
    #[error("Missing reference")]
    MissingReference,

    /// The order reference is not an order id.
    #[error("Invalid order reference: {0}")]
    InvalidReference(String),

    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Applying the result failed.
    #[error(transparent)]
    Checkout(CheckoutError),
}

impl From<CheckoutError> for WebhookError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::OrderNotFound(id) => WebhookError::OrderNotFound(id),
            other => WebhookError::Checkout(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_are_classified() {
        assert!(matches!(
            CheckoutError::from(GatewayError::Transient("timeout".into())),
            CheckoutError::GatewayUnavailable(_)
        ));
        assert!(matches!(
            CheckoutError::from(GatewayError::Unauthorized("401".into())),
            CheckoutError::GatewayMisconfigured(_)
        ));
        assert!(matches!(
            CheckoutError::from(GatewayError::Declined("insufficient funds".into())),
            CheckoutError::PaymentDeclined(_)
        ));
        assert!(matches!(
            CheckoutError::from(GatewayError::InvalidPhone("12".into())),
            CheckoutError::Validation(_)
        ));
    }

    #[test]
    fn test_raw_provider_text_is_not_displayed() {
        let err = CheckoutError::from(GatewayError::Unauthorized("bad api key abc123".into()));
        assert!(!err.to_string().contains("abc123"));

        let err = CheckoutError::from(GatewayError::Declined("channel 1114 inactive".into()));
        assert!(!err.to_string().contains("1114"));
    }

    #[test]
    fn test_store_not_found_becomes_order_not_found() {
        let id = OrderId::new();
        assert!(matches!(
            CheckoutError::from(StoreError::OrderNotFound(id)),
            CheckoutError::OrderNotFound(found) if found == id
        ));
    }
}
