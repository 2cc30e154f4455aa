//! Customer notifications on payment resolution.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

/// A payment outcome worth telling the customer about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderNotification {
    /// Payment confirmed.
    Paid {
        order_id: OrderId,
        customer_phone: String,
        payment_ref: Option<String>,
    },
    /// Payment declined; the order is cancelled.
    PaymentFailed {
        order_id: OrderId,
        customer_phone: String,
    },
}

impl OrderNotification {
    /// Builds the notification for an order that just reached a terminal
    /// payment status. Returns `None` for any other status.
    pub fn for_order(order: &Order) -> Option<Self> {
        use domain::OrderStatus;
        match order.status {
            OrderStatus::Paid => Some(OrderNotification::Paid {
                order_id: order.id,
                customer_phone: order.buyer.customer_phone.clone(),
                payment_ref: order.payment_ref.clone(),
            }),
            OrderStatus::Cancelled => Some(OrderNotification::PaymentFailed {
                order_id: order.id,
                customer_phone: order.buyer.customer_phone.clone(),
            }),
            _ => None,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderNotification::Paid { order_id, .. }
            | OrderNotification::PaymentFailed { order_id, .. } => *order_id,
        }
    }
}

/// Delivers notifications. Called once per applied terminal transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: OrderNotification);
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: OrderNotification) {
        match notification {
            OrderNotification::Paid {
                order_id,
                payment_ref,
                ..
            } => {
                tracing::info!(%order_id, payment_ref = ?payment_ref, "order paid notification");
            }
            OrderNotification::PaymentFailed { order_id, .. } => {
                tracing::info!(%order_id, "payment failed notification");
            }
        }
    }
}

/// Notifier that keeps every notification, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<OrderNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notifications received so far.
    pub fn sent(&self) -> Vec<OrderNotification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns how many notifications concern `order_id`.
    pub fn count_for(&self, order_id: OrderId) -> usize {
        self.sent()
            .iter()
            .filter(|n| n.order_id() == order_id)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: OrderNotification) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}
