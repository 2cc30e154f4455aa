//! Persisted order record and the validated constructor for new orders.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::currency;

use super::{BuyerInfo, Money, OrderError, OrderItem, OrderStatus, PaymentMethod};

/// Subtotal, shipping and total of an order, in the canonical currency.
///
/// Only constructible from the order's items, so `total == subtotal + shipping`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    subtotal: Money,
    shipping: Money,
    total: Money,
}

impl OrderTotals {
    /// Computes totals from trusted item prices.
    pub fn for_items(items: &[OrderItem]) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let shipping = currency::shipping_cost(subtotal);
        Self {
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn shipping(&self) -> Money {
        self.shipping
    }

    pub fn total(&self) -> Money {
        self.total
    }
}

/// An order as stored.
///
/// Totals and items are frozen at creation. Status and the payment
/// correlation fields change only through the store's atomic transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
    pub buyer: BuyerInfo,
    /// Weak reference to an account; the order outlives the account.
    pub user_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// Reference of the active payment attempt at the provider.
    pub provider_reference: Option<String>,
    /// Receipt reference reported on confirmation.
    pub payment_ref: Option<String>,
    pub google_pay_token: Option<serde_json::Value>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Amount to request from the mobile-money provider, in whole shillings.
    pub fn amount_kes(&self) -> i64 {
        currency::to_kes(self.total)
    }
}

/// A validated order that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub buyer: BuyerInfo,
    pub user_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Validates buyer details and items and freezes the totals.
    pub fn new(
        buyer: BuyerInfo,
        user_id: Option<String>,
        items: Vec<OrderItem>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let required = [
            ("customerName", &buyer.customer_name),
            ("customerEmail", &buyer.customer_email),
            ("customerPhone", &buyer.customer_phone),
            ("shippingAddress", &buyer.shipping_address),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(OrderError::MissingField(*field));
        }

        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if item.price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product: item.product_id.to_string(),
                    price: item.price,
                });
            }
        }

        let totals = OrderTotals::for_items(&items);
        Ok(Self {
            id: OrderId::new(),
            buyer,
            user_id: user_id.filter(|id| !id.trim().is_empty()),
            items,
            totals,
            created_at: Utc::now(),
        })
    }

    /// Builds the stored form of this order in its initial status.
    pub fn into_order(self) -> Order {
        Order {
            id: self.id,
            status: OrderStatus::Pending,
            subtotal: self.totals.subtotal(),
            shipping: self.totals.shipping(),
            total: self.totals.total(),
            buyer: self.buyer,
            user_id: self.user_id,
            payment_method: None,
            provider_reference: None,
            payment_ref: None,
            google_pay_token: None,
            items: self.items,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
